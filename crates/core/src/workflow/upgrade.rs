use crate::error::ActionResult;
use crate::exp_table;
use crate::vision::Element;

use super::ActionContext;

/// Level `slot` from `current_level` to `target_level`.
///
/// Opens the slot's detail view, presses the level-up control once per level,
/// and closes the view. Returns the number of presses; zero when already at goal,
/// in which case no input is sent at all.
pub fn upgrade_slot(
    ctx: &mut ActionContext,
    slot: usize,
    current_level: u32,
    target_level: u32,
) -> ActionResult<u32> {
    let clicks = exp_table::levels_to_gain(current_level, target_level);
    if clicks == 0 {
        ctx.log(&format!("slot {} already at level {}", slot + 1, current_level));
        return Ok(0);
    }
    ctx.log(&format!(
        "upgrading slot {}: level {} -> {} ({} level-ups)",
        slot + 1,
        current_level,
        target_level,
        clicks
    ));

    let settle = ctx.timings.click_settle_ms;
    let slot_el = ctx.slot(slot)?;
    ctx.wait_and_click(Element::PetTab, settle)?;
    ctx.wait_and_click(slot_el, settle)?;
    ctx.wait_and_click(Element::Details, settle)?;
    let button = ctx.wait_for(Element::Upgrade)?;
    for _ in 0..clicks {
        ctx.click(button, settle)?;
    }
    ctx.step("close details", |c| c.wait_and_click(Element::ClosePet, settle))?;
    ctx.step("close pet tab", |c| c.click_if_present(Element::PetTab, settle))?;
    ctx.log(&format!("slot {} upgraded to level {}", slot + 1, target_level));
    Ok(clicks)
}

/// Make `slot` the carried companion so the client reports its progress.
pub fn select_active(ctx: &mut ActionContext, slot: usize) -> ActionResult {
    let settle = ctx.timings.click_settle_ms;
    let slot_el = ctx.slot(slot)?;
    ctx.log(&format!("selecting slot {} as active", slot + 1));
    ctx.wait_and_click(Element::PetTab, settle)?;
    ctx.wait_and_click(slot_el, settle)?;
    ctx.wait_and_click(Element::Carry, settle)?;
    // reopening the detail view starts progress reporting
    ctx.step("reopen details", |c| {
        c.wait_and_click(Element::Details, settle)?;
        c.wait_and_click(Element::ClosePet, settle)
    })?;
    ctx.step("close pet tab", |c| c.click_if_present(Element::PetTab, settle))?;
    Ok(())
}
