use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use image::RgbImage;

use crate::logger;
use crate::types::SLOT_COUNT;

/// Every on-screen element a workflow can look for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Element {
    /// Companion slot 0..7 in the pet window.
    Slot(u8),
    PetTab,
    Carry,
    Details,
    /// "Save" in the detail view; makes the client record progress to disk.
    Save,
    ClosePet,
    Upgrade,
    PortalAthens,
    Search,
    PetManager,
    Merge,
    SlotA,
    SlotB,
    MergingPets,
    Bag,
    Catalyst,
    NewBag,
    PetInBag,
    CloseInterface,
    Mount,
    TransporterSearch,
    TransporterNpc,
    Transmit,
    Ok,
    ParnithaPort,
    Thebes,
    MycenaeTransporter,
    MycenaeInnerTransporter,
    TransmitMycenae,
    GoToMycenae,
    GoToLarissa,
    ThermopylaeButton,
    LarissaButton,
    Afk,
    StartAfk,
}

impl Element {
    pub const NAMED: [Element; 34] = [
        Element::PetTab,
        Element::Carry,
        Element::Details,
        Element::Save,
        Element::ClosePet,
        Element::Upgrade,
        Element::PortalAthens,
        Element::Search,
        Element::PetManager,
        Element::Merge,
        Element::SlotA,
        Element::SlotB,
        Element::MergingPets,
        Element::Bag,
        Element::Catalyst,
        Element::NewBag,
        Element::PetInBag,
        Element::CloseInterface,
        Element::Mount,
        Element::TransporterSearch,
        Element::TransporterNpc,
        Element::Transmit,
        Element::Ok,
        Element::ParnithaPort,
        Element::Thebes,
        Element::MycenaeTransporter,
        Element::MycenaeInnerTransporter,
        Element::TransmitMycenae,
        Element::GoToMycenae,
        Element::GoToLarissa,
        Element::ThermopylaeButton,
        Element::LarissaButton,
        Element::Afk,
        Element::StartAfk,
    ];

    /// Slot element for a 0-based index; None outside the pet window.
    pub fn slot(index: usize) -> Option<Element> {
        u8::try_from(index)
            .ok()
            .filter(|&i| usize::from(i) < SLOT_COUNT)
            .map(Element::Slot)
    }

    /// Slots first, then the named controls.
    pub fn all() -> Vec<Element> {
        (0..SLOT_COUNT as u8)
            .map(Element::Slot)
            .chain(Self::NAMED)
            .collect()
    }

    /// Stable symbolic name used in logs.
    pub fn name(&self) -> String {
        let s = match self {
            Element::Slot(i) => return format!("PET_{}", i + 1),
            Element::PetTab => "PET_TAB",
            Element::Carry => "CARRY",
            Element::Details => "DETAILS",
            Element::Save => "SAVE",
            Element::ClosePet => "CLOSE_PET",
            Element::Upgrade => "UPGRADE",
            Element::PortalAthens => "PORTAL_ATHENS",
            Element::Search => "SEARCH",
            Element::PetManager => "PET_MANAGER",
            Element::Merge => "MERGE",
            Element::SlotA => "SLOT_A",
            Element::SlotB => "SLOT_B",
            Element::MergingPets => "MERGING_PETS",
            Element::Bag => "BAG",
            Element::Catalyst => "MERGED_SPIRIT",
            Element::NewBag => "NEW_BAG",
            Element::PetInBag => "PET_IN_BAG",
            Element::CloseInterface => "CLOSE_INTERFACE",
            Element::Mount => "MOUNT",
            Element::TransporterSearch => "TRANSPORTER_SEARCH",
            Element::TransporterNpc => "TRANSPORTER_NPC",
            Element::Transmit => "TRANSMIT",
            Element::Ok => "OK",
            Element::ParnithaPort => "PARNITHA_PORT",
            Element::Thebes => "THEBES",
            Element::MycenaeTransporter => "MYCENAE_TRANSPORTER",
            Element::MycenaeInnerTransporter => "MYCENAE_INNER_TRANSPORTER",
            Element::TransmitMycenae => "TRANSMIT_MYCENAE",
            Element::GoToMycenae => "GO_TO_MYCENAE",
            Element::GoToLarissa => "GO_TO_LARISSA",
            Element::ThermopylaeButton => "THERMO_BTN",
            Element::LarissaButton => "LARISSA_BTN",
            Element::Afk => "AFK",
            Element::StartAfk => "START_AFK",
        };
        s.to_string()
    }

    /// Asset file name, e.g. `pet_3.png` or `close_interface.png`.
    pub fn file_name(&self) -> String {
        format!("{}.png", self.name().to_lowercase())
    }

    /// Offset from the match center to the real click target.
    pub fn default_offset(&self) -> (i32, i32) {
        match self {
            // slot templates frame the number tag left of the portrait
            Element::Slot(_) => (20, 0),
            // anchor stone sits above the NPC
            Element::TransporterNpc => (0, 170),
            _ => (0, 0),
        }
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

pub const DEFAULT_CONFIDENCE: f32 = 0.8;

/// Reference image plus match policy for one element.
#[derive(Debug, Clone)]
pub struct ElementTemplate {
    pub element: Element,
    pub image: RgbImage,
    pub min_confidence: f32,
    pub offset: (i32, i32),
}

impl ElementTemplate {
    pub fn new(element: Element, image: RgbImage) -> Self {
        Self {
            element,
            image,
            min_confidence: DEFAULT_CONFIDENCE,
            offset: element.default_offset(),
        }
    }

    pub fn with_confidence(mut self, min_confidence: f32) -> Self {
        self.min_confidence = min_confidence.clamp(0.0, 1.0);
        self
    }
}

/// Immutable table of templates, loaded once at start.
#[derive(Debug, Default)]
pub struct Catalog {
    templates: HashMap<Element, ElementTemplate>,
    reported_missing: Mutex<HashSet<Element>>,
}

impl Catalog {
    pub fn from_templates(templates: impl IntoIterator<Item = ElementTemplate>) -> Self {
        Self {
            templates: templates.into_iter().map(|t| (t.element, t)).collect(),
            reported_missing: Mutex::new(HashSet::new()),
        }
    }

    /// Load every `<name>.png` found in `dir`. Missing files are tolerated.
    pub fn load(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            anyhow::bail!("assets directory {} does not exist", dir.display());
        }
        let mut templates = Vec::new();
        for element in Element::all() {
            let path = dir.join(element.file_name());
            if !path.is_file() {
                continue;
            }
            let img = image::open(&path)
                .with_context(|| format!("failed to decode {}", path.display()))?
                .to_rgb8();
            templates.push(ElementTemplate::new(element, img));
        }
        logger::info(&format!(
            "loaded {}/{} templates from {}",
            templates.len(),
            Element::all().len(),
            dir.display()
        ));
        Ok(Self::from_templates(templates))
    }

    /// Template for `element`; logs once per element when it is missing.
    pub fn get(&self, element: Element) -> Option<&ElementTemplate> {
        let found = self.templates.get(&element);
        if found.is_none() {
            let mut reported = self.reported_missing.lock().unwrap_or_else(|e| e.into_inner());
            if reported.insert(element) {
                logger::warn(&format!("no template for {}, treating as not found", element));
            }
        }
        found
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}
