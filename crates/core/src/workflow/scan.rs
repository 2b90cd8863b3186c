use crate::error::ActionResult;
use crate::settings::Goal;
use crate::signal::{map_rows_to_slots, ScanRow, SignalChannel};
use crate::types::{CaptureRect, ManagedInstance};
use crate::vision::{Element, NumericReader};

use super::ActionContext;

/// Optional on-screen reading of the detail view's metric.
pub struct MetricOcr<'r> {
    pub reader: &'r NumericReader,
    pub region: CaptureRect,
}

/// Outcome of recording every processed slot.
#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    /// Dump rows paired with the slot they describe.
    pub rows: Vec<(usize, ScanRow)>,
    /// Metrics read off-screen, per slot, before the dump arrived.
    pub provisional: Vec<(usize, u64)>,
    pub status: String,
}

/// Open the slot list, record each processed slot, then consume the dump file.
pub fn scan_slots(
    ctx: &mut ActionContext,
    name: &str,
    processed: &[usize],
    signal: &SignalChannel,
    ocr: Option<&MetricOcr>,
) -> ActionResult<ScanReport> {
    let settle = ctx.timings.scan_settle_ms;
    ctx.log(&format!("scanning {} slot(s)", processed.len()));
    ctx.step("open pet tab", |c| c.wait_and_click(Element::PetTab, settle))?;

    let mut provisional = Vec::new();
    for &slot in processed {
        let reading = ctx.step(&format!("record slot {}", slot + 1), |c| {
            let slot_el = c.slot(slot)?;
            c.wait_and_click(slot_el, settle)?;
            c.wait_and_click(Element::Details, settle)?;
            let reading = ocr.and_then(|o| read_metric(c, o));
            c.wait_and_click(Element::Save, settle)?;
            c.wait_and_click(Element::ClosePet, settle)?;
            Ok(reading)
        })?;
        if let Some(Some(metric)) = reading {
            provisional.push((slot, metric));
        }
    }

    ctx.wait_ms(ctx.timings.record_wait_ms)?;
    let rows = signal.take_scan(name).unwrap_or_default();
    let found = rows.len();
    let rows = map_rows_to_slots(rows, processed);

    // second click on the tab closes the list
    ctx.step("close pet tab", |c| c.click_if_present(Element::PetTab, c.timings.minimize_ms))?;

    let status = if found >= processed.len() {
        "Success".to_string()
    } else {
        format!("Only {} pets found", found)
    };
    ctx.log(&format!("scan finished: {}", status));
    Ok(ScanReport { rows, provisional, status })
}

fn read_metric(ctx: &mut ActionContext, ocr: &MetricOcr) -> Option<u64> {
    let capture = ctx.window.capture(Some(ocr.region))?;
    let value = ocr.reader.read_number(&capture.to_rgb());
    match value {
        Some(v) => ctx.log(&format!("read metric {} on screen", v)),
        None => ctx.warn("metric not readable on screen"),
    }
    value
}

/// Fold a scan into the instance. Returns the slots ready to be levelled to the goal.
pub fn apply_scan(inst: &mut ManagedInstance, report: &ScanReport, goal: &Goal) -> Vec<usize> {
    // dump rows win over on-screen readings
    for &(slot, metric) in &report.provisional {
        if report.rows.iter().any(|(s, _)| *s == slot) {
            continue;
        }
        if let Some(rec) = inst.slots.get_mut(slot) {
            rec.observe_metric(metric);
        }
    }
    for (slot, row) in &report.rows {
        let Some(rec) = inst.slots.get_mut(*slot) else { continue };
        rec.pet_id = Some(row.pet_id);
        rec.pet_name = row.name.clone();
        rec.level = row.level;
        rec.next_level_metric = row.next_level_metric;
        rec.observe_metric(row.current_metric);
        rec.completed = row.level >= goal.target_level;
    }
    inst.status = report.status.clone();

    inst.processed_slots()
        .into_iter()
        .filter(|&i| {
            let rec = &inst.slots[i];
            !rec.is_done() && rec.level > 0 && goal.is_ready(rec.current_metric)
        })
        .collect()
}
