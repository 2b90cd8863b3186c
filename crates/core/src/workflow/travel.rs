use crate::error::ActionResult;
use crate::settings::Destination;
use crate::vision::Element;

use super::ActionContext;

/// Mount up, take the transporter out of Athens and ride to `destination`.
pub fn travel_to(ctx: &mut ActionContext, destination: Destination) -> ActionResult {
    let settle = ctx.timings.click_settle_ms;
    ctx.log(&format!("travelling to {:?}", destination));

    ctx.wait_and_click(Element::Mount, ctx.timings.mount_wait_ms)?;
    ctx.wait_and_click(Element::Search, settle)?;
    ctx.wait_and_click(Element::TransporterSearch, ctx.timings.transporter_wait_ms)?;

    let npc = ctx.wait_for(Element::TransporterNpc)?;
    ctx.hover_click(npc, ctx.timings.npc_dialog_ms)?;
    ctx.wait_and_click(Element::Transmit, settle)?;

    match destination {
        Destination::Thermopylae => thermopylae(ctx),
        Destination::Larissa => larissa(ctx),
    }
}

fn confirm(ctx: &mut ActionContext) -> ActionResult {
    if ctx.click_if_present(Element::Ok, ctx.timings.click_settle_ms)? {
        ctx.log("confirmed travel");
    }
    Ok(())
}

fn thermopylae(ctx: &mut ActionContext) -> ActionResult {
    ctx.wait_and_click(Element::ParnithaPort, ctx.timings.click_settle_ms)?;
    confirm(ctx)?;
    ctx.wait_ms(ctx.timings.ok_wait_ms)?;
    ctx.wait_and_click(Element::ThermopylaeButton, ctx.timings.thermopylae_wait_ms)?;
    ctx.log("arrived at Thermopylae");
    Ok(())
}

/// Thebes, then two Mycenae transporters, then Larissa.
fn larissa(ctx: &mut ActionContext) -> ActionResult {
    let settle = ctx.timings.click_settle_ms;
    ctx.wait_and_click(Element::Thebes, settle)?;
    confirm(ctx)?;
    ctx.wait_ms(ctx.timings.thebes_wait_ms)?;

    // the generic transporter template matches when the Mycenae one does not
    let (_, npc) = ctx.wait_for_any(&[Element::MycenaeTransporter, Element::TransporterNpc])?;
    ctx.hover_click(npc, ctx.timings.mycenae_npc_ms)?;
    ctx.wait_and_click(Element::Transmit, settle)?;
    ctx.wait_and_click(Element::GoToMycenae, settle)?;
    confirm(ctx)?;
    ctx.wait_ms(ctx.timings.mycenae_wait_ms)?;

    let (_, inner) = ctx.wait_for_any(&[Element::MycenaeInnerTransporter, Element::TransporterNpc])?;
    ctx.hover_click(inner, ctx.timings.mycenae_inner_ms)?;
    let (_, transmit) = ctx.wait_for_any(&[Element::TransmitMycenae, Element::Transmit])?;
    ctx.click(transmit, settle)?;
    ctx.wait_and_click(Element::GoToLarissa, settle)?;
    confirm(ctx)?;
    ctx.wait_ms(ctx.timings.larissa_hop_ms)?;

    ctx.wait_and_click(Element::LarissaButton, ctx.timings.larissa_wait_ms)?;
    ctx.log("arrived at Larissa");
    Ok(())
}
