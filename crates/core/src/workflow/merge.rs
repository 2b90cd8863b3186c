//! Merge the provider slots into a receiver, collect the results, then park the
//! character and start AFK.

use crate::error::{ActionError, ActionResult};
use crate::settings::MergeConfig;
use crate::types::MouseButton;
use crate::vision::Element;

use super::{travel, ActionContext};

/// Catalyst items consumed per merge.
pub const CATALYST_PER_MERGE: u32 = 6;
/// The merge control needs apply, merge, finish and close.
pub const CONFIRM_CLICKS: u32 = 4;
pub const BAG_ATTEMPTS: u32 = 20;
pub const BAG_MISSES_BEFORE_SWITCH: u32 = 3;
pub const CLOSE_ATTEMPTS: u32 = 10;
/// SLOT_A left of this means the merge panel is still in its default spot.
const PANEL_PARKED_X: i32 = 400;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub merges_completed: u32,
    pub pets_collected: u32,
    pub catalyst_depleted: bool,
}

/// Full merge/travel sequence. Steps that cannot run are skipped and logged.
pub fn run_merge(ctx: &mut ActionContext, cfg: &MergeConfig) -> ActionResult<MergeReport> {
    let total = cfg.iterations();
    ctx.log(&format!(
        "merging {} pet(s) into slot {}, provider slot {}",
        total,
        cfg.receiver_slot + 1,
        cfg.provider_slot + 1
    ));

    ctx.step("portal to Athens", portal_to_athens)?;
    ctx.step("open pet manager", open_pet_manager)?;
    ctx.step("set up merge panel", |c| setup_merge_panel(c, cfg.receiver_slot))?;

    let mut report = MergeReport::default();
    let mut catalyst = cfg.use_catalyst;
    while report.merges_completed < total {
        let done = ctx.step("merge", |c| merge_once(c, cfg.receiver_slot, cfg.provider_slot, catalyst))?;
        match done {
            Some(still_has_catalyst) => {
                catalyst = still_has_catalyst;
                report.merges_completed += 1;
                ctx.log(&format!(
                    "merge {}/{} done (provider slot {})",
                    report.merges_completed,
                    total,
                    cfg.provider_slot + 1
                ));
            }
            None => {
                ctx.warn(&format!("merge failed at iteration {}", report.merges_completed + 1));
                break;
            }
        }
    }
    report.catalyst_depleted = cfg.use_catalyst && !catalyst;

    report.pets_collected = ctx.step("collect pets", collect_pets)?.unwrap_or(0);
    let carry = if report.pets_collected > 0 { cfg.provider_slot } else { cfg.receiver_slot };
    ctx.step("set carry", |c| set_carry(c, carry))?;
    ctx.step("close interfaces", close_interfaces)?;
    ctx.step("travel", |c| travel::travel_to(c, cfg.destination))?;
    ctx.step("start AFK", |c| start_afk(c, cfg.final_slot))?;

    ctx.log(&format!(
        "merge run complete: {} merges, {} pets collected",
        report.merges_completed, report.pets_collected
    ));
    Ok(report)
}

/// Click the portal repeatedly once it shows up, then wait for the zone load.
fn portal_to_athens(ctx: &mut ActionContext) -> ActionResult {
    let clicks = ctx.timings.portal_clicks.max(1);
    let interval = ctx.timings.portal_click_window_ms / clicks as u64;
    let mut done = 0u32;
    let mut misses = 0u32;
    while done < clicks {
        ctx.checkpoint()?;
        match ctx.locate(Element::PortalAthens) {
            Some(hit) => {
                ctx.click(hit, interval)?;
                if done == 0 {
                    ctx.log(&format!("portal found, clicking {}x", clicks));
                }
                done += 1;
            }
            None => {
                misses += 1;
                if misses == 1 {
                    ctx.log("waiting for PORTAL_ATHENS");
                }
                if ctx.retry.exhausted(misses) {
                    return Err(ActionError::NotFound(Element::PortalAthens));
                }
                ctx.sleep(ctx.retry.delay())?;
            }
        }
    }
    ctx.log(&format!("portal used, waiting {}ms", ctx.timings.portal_wait_ms));
    ctx.wait_ms(ctx.timings.portal_wait_ms)
}

fn open_pet_manager(ctx: &mut ActionContext) -> ActionResult {
    let settle = ctx.timings.click_settle_ms;
    ctx.wait_and_click(Element::Search, settle)?;
    ctx.wait_and_click(Element::PetManager, settle)?;
    ctx.log(&format!("pet manager opening, waiting {}ms", ctx.timings.pet_manager_wait_ms));
    ctx.wait_ms(ctx.timings.pet_manager_wait_ms)?;
    ctx.wait_and_click(Element::PetTab, settle)?;
    Ok(())
}

fn setup_merge_panel(ctx: &mut ActionContext, receiver: usize) -> ActionResult {
    let settle = ctx.timings.click_settle_ms;
    let slot = ctx.slot(receiver)?;
    ctx.wait_and_click(slot, settle)?;
    ctx.wait_and_click(Element::Carry, settle)?;
    ctx.wait_and_click(Element::Merge, ctx.timings.merge_open_ms)?;

    ctx.checkpoint()?;
    if let Some(slot_a) = ctx.locate(Element::SlotA) {
        if slot_a.x < PANEL_PARKED_X {
            let width = ctx.window.region().map_or(0, |r| r.w);
            ctx.move_panel((200, 300), (width - 100, 100))?;
            ctx.log("moved merge panel to the corner");
        }
    }
    Ok(())
}

/// One merge. Returns whether catalyst is still believed to be available.
fn merge_once(ctx: &mut ActionContext, receiver: usize, provider: usize, catalyst: bool) -> ActionResult<bool> {
    let (receiver, provider) = (ctx.slot(receiver)?, ctx.slot(provider)?);
    let from = ctx.wait_for(receiver)?;
    let to = ctx.wait_for(Element::SlotA)?;
    ctx.drag_between((from.x, from.y), (to.x, to.y))?;

    let from = ctx.wait_for(provider)?;
    let to = ctx.wait_for(Element::SlotB)?;
    ctx.drag_between((from.x, from.y), (to.x, to.y))?;

    let mut catalyst_left = catalyst;
    if catalyst {
        catalyst_left = use_catalyst(ctx)?;
    }

    let confirm = ctx.wait_for(Element::MergingPets)?;
    for _ in 0..CONFIRM_CLICKS {
        ctx.click(confirm, ctx.timings.merge_confirm_ms)?;
    }
    ctx.wait_ms(ctx.timings.merge_open_ms)?;
    // the panel closes after confirming
    ctx.click_if_present(Element::Merge, ctx.timings.merge_open_ms)?;
    Ok(catalyst_left)
}

/// Empty and exhausted inventories look the same here, so a miss ends catalyst use.
fn use_catalyst(ctx: &mut ActionContext) -> ActionResult<bool> {
    let Some(bag) = ctx.locate(Element::Bag) else { return Ok(true) };
    ctx.click(bag, ctx.timings.merge_open_ms)?;
    let left = match ctx.locate(Element::Catalyst) {
        Some(item) => {
            for _ in 0..CATALYST_PER_MERGE {
                ctx.click_at(item.x, item.y, ctx.timings.catalyst_click_ms, MouseButton::Right)?;
            }
            ctx.log(&format!("used {} catalyst", CATALYST_PER_MERGE));
            true
        }
        None => {
            ctx.warn("no catalyst found, continuing without");
            false
        }
    };
    ctx.click(bag, ctx.timings.catalyst_click_ms)?;
    Ok(left)
}

/// Right-click new pets out of the bag; switch to the new-bag tab after a run of misses.
fn collect_pets(ctx: &mut ActionContext) -> ActionResult<u32> {
    let bag = ctx.wait_and_click(Element::Bag, ctx.timings.merge_open_ms)?;
    let (mut collected, mut misses, mut switched) = (0u32, 0u32, false);
    for _ in 0..BAG_ATTEMPTS {
        ctx.checkpoint()?;
        if misses >= BAG_MISSES_BEFORE_SWITCH && !switched {
            ctx.log("bag looks empty, switching to the new bag");
            ctx.wait_and_click(Element::NewBag, ctx.timings.merge_open_ms)?;
            switched = true;
            misses = 0;
        }
        match ctx.locate(Element::PetInBag) {
            Some(pet) => {
                ctx.click_at(pet.x, pet.y, ctx.timings.bag_click_ms, MouseButton::Right)?;
                collected += 1;
                misses = 0;
            }
            None => misses += 1,
        }
    }
    ctx.click(bag, ctx.timings.click_settle_ms)?;
    ctx.log(&format!("collected {} pet(s)", collected));
    Ok(collected)
}

fn set_carry(ctx: &mut ActionContext, slot: usize) -> ActionResult {
    let slot_el = ctx.slot(slot)?;
    if ctx.click_if_present(slot_el, ctx.timings.click_settle_ms)?
        && ctx.click_if_present(Element::Carry, ctx.timings.click_settle_ms)?
    {
        ctx.log(&format!("slot {} set to carry", slot + 1));
    }
    Ok(())
}

/// Bounded: stops as soon as nothing is left to close.
fn close_interfaces(ctx: &mut ActionContext) -> ActionResult {
    for _ in 0..CLOSE_ATTEMPTS {
        if !ctx.click_if_present(Element::CloseInterface, ctx.timings.close_click_ms)? {
            break;
        }
    }
    Ok(())
}

fn start_afk(ctx: &mut ActionContext, final_slot: usize) -> ActionResult {
    let settle = ctx.timings.click_settle_ms;
    // dismount
    ctx.click_if_present(Element::Mount, ctx.timings.dismount_ms)?;
    if ctx.click_if_present(Element::PetTab, settle)? {
        set_carry(ctx, final_slot)?;
    }
    ctx.click_if_present(Element::ClosePet, settle)?;
    ctx.wait_and_click(Element::Afk, settle)?;
    ctx.wait_and_click(Element::StartAfk, settle)?;
    ctx.log("AFK started");
    Ok(())
}
