//! End-to-end scenarios against the simulated screen.

use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use libtest_mimic::{Arguments, Failed, Trial};

use petfactory_core::logger;
use petfactory_core::orchestrator::RunMode;
use petfactory_core::pause::{PauseToken, RetryPolicy};
use petfactory_core::platform::stub::StubPlatform;
use petfactory_core::platform::Platform;
use petfactory_core::settings::{Destination, MergeConfig, RetrySettings, Timings};
use petfactory_core::types::{InstanceState, MouseButton, OrchestratorState};
use petfactory_core::vision::{Element, NumericReader};
use petfactory_core::workflow::ActionContext;
use petfactory_test::*;

macro_rules! ensure {
    ($cond:expr, $($msg:tt)+) => {
        if !$cond {
            return Err(format!($($msg)+).into());
        }
    };
}

const ALICE: u64 = 1;
const BOB: u64 = 2;

fn pid(id: u64) -> u32 {
    id as u32 + 1000
}

fn merge_keeps_provider_slot() -> Result<(), Failed> {
    let world = World::new();
    world.add_client(ALICE, "Alice", growing_pets(100, 10));
    world.fill_bag(ALICE, 2);
    let mut engine = world.engine(world.settings());

    let cfg = MergeConfig { provider_slot: 5, use_catalyst: true, ..Default::default() };
    let report = engine.merge("Alice", &cfg)?;
    ensure!(report.merges_completed == 3, "expected 3 merges, got {}", report.merges_completed);
    ensure!(report.pets_collected == 2, "collected {}", report.pets_collected);
    ensure!(!report.catalyst_depleted, "catalyst was on screen");

    let slot_b = world.screen_point(ALICE, Element::SlotB);
    let provider = world.screen_point(ALICE, Element::Slot(5));
    let into_b: Vec<_> = world.screen.drags().into_iter().filter(|d| d.to == slot_b).collect();
    ensure!(into_b.len() == 3, "{} drags into slot B", into_b.len());
    ensure!(
        into_b.iter().all(|d| d.from == (provider.0 + 2, provider.1)),
        "provider moved: {:?}",
        into_b
    );

    let catalyst = world.screen_point(ALICE, Element::Catalyst);
    let uses = world
        .screen
        .clicks()
        .iter()
        .filter(|c| c.button == MouseButton::Right && (c.x, c.y) == catalyst)
        .count();
    ensure!(uses == 18, "catalyst used {} times", uses);

    let afk = world.screen_point(ALICE, Element::StartAfk);
    ensure!(world.screen.clicks().iter().any(|c| (c.x, c.y) == afk), "AFK never started");
    ensure!(world.client(ALICE, |c| c.carried) == Some(0), "final slot not carried");
    Ok(())
}

fn larissa_route_without_catalyst() -> Result<(), Failed> {
    let world = World::new();
    world.add_client(ALICE, "Alice", growing_pets(150, 10));
    world.fill_bag(ALICE, 0);
    world.set_visible(ALICE, Element::Catalyst, false);
    world.set_visible(ALICE, Element::MycenaeTransporter, false);
    let mut engine = world.engine(world.settings());

    let cfg = MergeConfig {
        provider_slot: 6,
        use_catalyst: true,
        destination: Destination::Larissa,
        ..Default::default()
    };
    let report = engine.merge("Alice", &cfg)?;
    ensure!(report.merges_completed == 2, "expected 2 merges, got {}", report.merges_completed);
    ensure!(report.catalyst_depleted, "missing catalyst not reported");
    ensure!(report.pets_collected == 0, "collected {}", report.pets_collected);

    let clicks = world.screen.clicks();
    let count = |el: Element| {
        let p = world.screen_point(ALICE, el);
        clicks.iter().filter(|c| (c.x, c.y) == p).count()
    };
    ensure!(count(Element::TransporterNpc) == 2, "transporter NPC clicked {} times", count(Element::TransporterNpc));
    ensure!(count(Element::NewBag) == 1, "new bag opened {} times", count(Element::NewBag));
    ensure!(count(Element::LarissaButton) == 1, "never reached Larissa");
    ensure!(count(Element::ThermopylaeButton) == 0, "went to Thermopylae");
    ensure!(clicks.iter().all(|c| c.button == MouseButton::Left), "right-click without catalyst or pets");
    Ok(())
}

fn alert_triggers_upgrade() -> Result<(), Failed> {
    let world = World::new();
    world.add_client(ALICE, "Alice", growing_pets(100, 20));
    let mut engine = world.engine(world.settings());
    engine.refresh();
    engine.setup(RunMode::Full)?;

    let registry = engine.registry();
    let alice = registry.get(pid(ALICE)).ok_or("Alice not tracked")?;
    ensure!(alice.state == InstanceState::Waiting, "state {:?}", alice.state);
    ensure!(alice.active_slot == Some(0), "active {:?}", alice.active_slot);

    world.write_alert("Alice", 100, 25, 6_000_000);
    engine.poll_once()?;

    ensure!(!world.alert_path("Alice").exists(), "alert file not deleted");
    let ups = world.client(ALICE, |c| c.level_ups);
    ensure!(ups[0] == 5, "slot 1 got {} level-ups", ups[0]);
    ensure!(ups[1..].iter().all(|&n| n == 0), "other slots touched: {:?}", ups);

    let alice = registry.get(pid(ALICE)).ok_or("Alice not tracked")?;
    ensure!(alice.slots[0].completed, "slot 1 not completed");
    ensure!(alice.active_slot == Some(1), "active {:?}", alice.active_slot);
    ensure!(world.client(ALICE, |c| c.carried) == Some(1), "client carries {:?}", world.client(ALICE, |c| c.carried));
    Ok(())
}

fn ready_slot_levels_during_setup() -> Result<(), Failed> {
    let world = World::new();
    let mut pets = growing_pets(200, 10);
    pets[3].level = 28;
    pets[3].exp = 12_000_000;
    world.add_client(ALICE, "Alice", pets);
    let mut engine = world.engine(world.settings());
    engine.refresh();
    engine.setup(RunMode::Full)?;

    let ups = world.client(ALICE, |c| c.level_ups);
    ensure!(ups == [0, 0, 0, 2, 0, 0, 0, 0], "level-ups {:?}", ups);
    let alice = engine.registry().get(pid(ALICE)).ok_or("Alice not tracked")?;
    ensure!(alice.slots[3].completed && alice.slots[3].level == 30, "slot 4 {:?}", alice.slots[3]);
    ensure!(alice.active_slot == Some(0), "active {:?}", alice.active_slot);
    ensure!(alice.status == "Success", "status {}", alice.status);
    Ok(())
}

fn scan_rows_skip_ignored_slots() -> Result<(), Failed> {
    let world = World::new();
    world.add_client(ALICE, "Alice", growing_pets(300, 12));
    let mut settings = world.settings();
    settings.ignored_slots.insert("Alice".into(), vec![0, 2]);
    let mut engine = world.engine(settings);
    engine.refresh();
    engine.setup(RunMode::Full)?;

    let alice = engine.registry().get(pid(ALICE)).ok_or("Alice not tracked")?;
    for (slot, rec) in alice.slots.iter().enumerate() {
        let expected = if slot == 0 || slot == 2 { None } else { Some(300 + slot as u64) };
        ensure!(rec.pet_id == expected, "slot {} holds {:?}", slot + 1, rec.pet_id);
    }
    ensure!(alice.active_slot == Some(1), "active {:?}", alice.active_slot);
    ensure!(!world.signal_dir.path().join("Alice_exp.txt").exists(), "dump not consumed");
    Ok(())
}

fn ignored_slot_never_active() -> Result<(), Failed> {
    let world = World::new();
    let mut pets = growing_pets(400, 15);
    pets[2].level = 30;
    world.add_client(ALICE, "Alice", pets);
    let mut settings = world.settings();
    settings.ignored_slots.insert("Alice".into(), vec![0, 1]);
    let mut engine = world.engine(settings);
    engine.refresh();
    engine.setup(RunMode::Full)?;

    let registry = engine.registry();
    let alice = registry.get(pid(ALICE)).ok_or("Alice not tracked")?;
    ensure!(alice.slots[2].completed, "slot 3 already at goal");
    ensure!(alice.active_slot == Some(3), "active {:?}", alice.active_slot);

    world.write_alert("Alice", 403, 29, 6_000_000);
    engine.poll_once()?;
    let alice = registry.get(pid(ALICE)).ok_or("Alice not tracked")?;
    ensure!(alice.active_slot == Some(4), "active {:?}", alice.active_slot);
    ensure!(!registry.set_active(pid(ALICE), Some(1)), "ignored slot accepted");
    Ok(())
}

fn pause_holds_waiting_click() -> Result<(), Failed> {
    let world = World::new();
    let info = world.add_client(ALICE, "Alice", growing_pets(500, 10));
    world.set_visible(ALICE, Element::PortalAthens, false);
    let platform = StubPlatform::new(world.screen.clone());
    let mut window = platform.create_window(&info);
    let token = PauseToken::new();
    let catalog = world.catalog.clone();

    let (held, result) = thread::scope(|s| {
        let waiter = s.spawn(|| {
            let mut ctx = ActionContext::new(
                window.as_mut(),
                &catalog,
                &token,
                RetryPolicy::forever(SHORT_WAIT),
                Timings::instant(),
                (1920, 1080),
                "Alice",
            );
            ctx.wait_and_click(Element::PortalAthens, 0).map(|_| ())
        });
        thread::sleep(Duration::from_millis(100));
        token.set_paused(true);
        thread::sleep(Duration::from_millis(100));
        world.set_visible(ALICE, Element::PortalAthens, true);
        thread::sleep(Duration::from_millis(300));
        let held = world.screen.clicks().len();
        token.set_paused(false);
        (held, waiter.join())
    });

    ensure!(held == 0, "{} click(s) while paused", held);
    ensure!(matches!(result, Ok(Ok(()))), "wait failed: {:?}", result.ok());
    let portal = world.screen_point(ALICE, Element::PortalAthens);
    let clicks = world.screen.clicks();
    ensure!(clicks.len() == 1 && (clicks[0].x, clicks[0].y) == portal, "clicks {:?}", clicks);
    Ok(())
}

fn closed_window_fails_only_its_instance() -> Result<(), Failed> {
    let world = World::new();
    world.add_client(ALICE, "Alice", growing_pets(600, 10));
    world.add_client(BOB, "Bob", growing_pets(700, 10));
    let mut engine = world.engine(world.settings());
    engine.refresh();
    world.screen.close_window(ALICE);
    engine.setup(RunMode::Full)?;

    let registry = engine.registry();
    let alice = registry.get(pid(ALICE)).ok_or("Alice not tracked")?;
    ensure!(alice.state == InstanceState::Error, "Alice {:?}", alice.state);
    ensure!(alice.status == "Window not found", "status {}", alice.status);
    let bob = registry.get(pid(BOB)).ok_or("Bob not tracked")?;
    ensure!(bob.state == InstanceState::Waiting, "Bob {:?}", bob.state);
    ensure!(world.client(BOB, |c| c.carried) == Some(0), "Bob never selected a slot");
    Ok(())
}

fn disconnected_instance_is_skipped() -> Result<(), Failed> {
    let world = World::new();
    world.add_client(ALICE, "Alice", growing_pets(800, 10));
    world.add_client(BOB, "Bob", growing_pets(900, 10));
    let mut engine = world.engine(world.settings());
    engine.refresh();
    engine.registry().disconnect_handle().mark_disconnected(pid(ALICE));
    engine.setup(RunMode::Full)?;

    ensure!(world.client(ALICE, |c| c.selected).is_none(), "Alice was driven");
    ensure!(world.client(BOB, |c| c.carried) == Some(0), "Bob was not set up");

    world.write_alert("Alice", 800, 25, 6_000_000);
    engine.poll_once()?;
    ensure!(world.alert_path("Alice").exists(), "alert consumed for a disconnected instance");
    let watchdog = engine.registry().disconnect_handle();
    ensure!(watchdog.is_disconnected(pid(ALICE)), "Alice recovered on her own");
    Ok(())
}

fn disconnect_during_setup_frees_the_rest() -> Result<(), Failed> {
    let world = World::new();
    world.add_client(ALICE, "Alice", growing_pets(1300, 10));
    world.add_client(BOB, "Bob", growing_pets(1400, 10));
    // Alice's pet tab never shows up, so her scan waits without a ceiling
    world.set_visible(ALICE, Element::PetTab, false);
    let mut settings = world.settings();
    settings.retry = RetrySettings { backoff_ms: 20, max_attempts: None, log_every: 0 };
    let token = PauseToken::new();
    let mut engine = world.engine_with_token(settings, token.clone());
    engine.refresh();

    let watchdog = engine.registry().disconnect_handle();
    let backstop = token.clone();
    let (done_tx, done_rx) = mpsc::channel::<()>();
    let result = thread::scope(|s| {
        s.spawn(move || {
            thread::sleep(Duration::from_millis(100));
            watchdog.mark_disconnected(pid(ALICE));
        });
        // a wait that never ends fails the scenario instead of hanging it
        s.spawn(move || {
            if done_rx.recv_timeout(Duration::from_secs(5)).is_err() {
                backstop.request_stop();
            }
        });
        let result = engine.setup(RunMode::Full);
        let _ = done_tx.send(());
        result
    });

    ensure!(result.is_ok(), "setup ended with {:?}", result);
    let registry = engine.registry();
    let alice = registry.get(pid(ALICE)).ok_or("Alice not tracked")?;
    ensure!(alice.state == InstanceState::Disconnected, "Alice {:?}", alice.state);
    ensure!(world.client(ALICE, |c| c.selected).is_none(), "Alice was driven");
    let bob = registry.get(pid(BOB)).ok_or("Bob not tracked")?;
    ensure!(bob.state == InstanceState::Waiting, "Bob {:?}", bob.state);
    ensure!(world.client(BOB, |c| c.carried) == Some(0), "Bob was not set up");
    Ok(())
}

fn on_screen_metric_fills_missing_rows() -> Result<(), Failed> {
    let world = World::new();
    let mut pets = growing_pets(1500, 10);
    pets[7].exp = 7_654_321;
    world.add_client(ALICE, "Alice", pets);
    world.client_mut(ALICE, |c| {
        // rows pair with slots in order, so only the last slot can go missing
        c.unsaved.push(7);
        c.shown_exp[2] = Some(4_444_444);
    });
    let mut settings = world.settings();
    settings.ocr.metric_region = Some(METRIC_REGION);
    let reader = Arc::new(NumericReader::new(Box::new(digit_font())));
    let mut engine = world.engine(settings).with_reader(reader);
    engine.run(RunMode::Analyze);

    let alice = engine.registry().get(pid(ALICE)).ok_or("Alice not tracked")?;
    let missing = &alice.slots[7];
    ensure!(missing.pet_id.is_none(), "slot 8 got a dump row: {:?}", missing);
    ensure!(missing.current_metric == 7_654_321, "slot 8 read {}", missing.current_metric);
    let dumped = &alice.slots[2];
    ensure!(dumped.pet_id == Some(1502), "slot 3 holds {:?}", dumped.pet_id);
    ensure!(dumped.current_metric == 3_000, "dump row did not win: {}", dumped.current_metric);
    ensure!(alice.status == "Only 7 pets found", "status {}", alice.status);
    Ok(())
}

fn analyze_touches_no_levels() -> Result<(), Failed> {
    let world = World::new();
    let mut pets = growing_pets(1000, 10);
    pets[0].level = 29;
    pets[0].exp = 9_000_000;
    world.add_client(ALICE, "Alice", pets);
    let mut engine = world.engine(world.settings());
    engine.run(RunMode::Analyze);

    ensure!(engine.state() == OrchestratorState::Stopped, "engine still {:?}", engine.state());
    let ups = world.client(ALICE, |c| c.level_ups);
    ensure!(ups.iter().all(|&n| n == 0), "analyze levelled {:?}", ups);
    let alice = engine.registry().get(pid(ALICE)).ok_or("Alice not tracked")?;
    ensure!(alice.state == InstanceState::Idle, "state {:?}", alice.state);
    ensure!(world.screen.foreground().is_none(), "window left in front");
    ensure!(alice.slots[0].level == 29 && alice.slots[7].pet_id == Some(1007), "slots {:?}", alice.slots);
    Ok(())
}

fn finished_instances_end_the_run() -> Result<(), Failed> {
    let world = World::new();
    world.add_client(ALICE, "Alice", growing_pets(1100, 30));
    let mut engine = world.engine(world.settings());
    engine.run(RunMode::Full);

    let alice = engine.registry().get(pid(ALICE)).ok_or("Alice not tracked")?;
    ensure!(alice.state == InstanceState::Complete, "state {:?}", alice.state);
    ensure!(alice.active_slot.is_none(), "active {:?}", alice.active_slot);
    ensure!(world.client(ALICE, |c| c.level_ups) == [0; 8], "levelled a finished pet");
    Ok(())
}

fn main() {
    logger::init_memory();
    let args = Arguments::from_args();
    let trials = vec![
        Trial::test("merge::provider_slot_is_fixed", merge_keeps_provider_slot),
        Trial::test("merge::larissa_without_catalyst", larissa_route_without_catalyst),
        Trial::test("poll::alert_triggers_upgrade", alert_triggers_upgrade),
        Trial::test("setup::ready_slot_levels", ready_slot_levels_during_setup),
        Trial::test("setup::rows_skip_ignored_slots", scan_rows_skip_ignored_slots),
        Trial::test("setup::ignored_slot_never_active", ignored_slot_never_active),
        Trial::test("actions::pause_holds_click", pause_holds_waiting_click),
        Trial::test("engine::closed_window_fails_alone", closed_window_fails_only_its_instance),
        Trial::test("engine::disconnected_is_skipped", disconnected_instance_is_skipped),
        Trial::test("engine::disconnect_mid_wait", disconnect_during_setup_frees_the_rest),
        Trial::test("scan::on_screen_metric", on_screen_metric_fills_missing_rows),
        Trial::test("engine::analyze_is_read_only", analyze_touches_no_levels),
        Trial::test("engine::finished_run_stops", finished_instances_end_the_run),
    ];
    libtest_mimic::run(&args, trials).exit();
}
