//! Playtest runner - headless automation of the demo scene
//!
//! Builds a minimal Bevy app with the playtest plugin, schedules the
//! scenario's bots, ticks until every bot has finished or the tick budget is
//! spent, then finalizes the recording.
//!
//! Usage:
//!   cargo run --bin playtest -- --help
//!   cargo run --bin playtest -- --ticks 300 --seed 7
//!   cargo run --bin playtest -- --scenario scenarios/start_game.toml

use bevy::log::{Level, LogPlugin};
use bevy::prelude::*;
use bevy::time::TimeUpdateStrategy;
use playtest::bots::goal::client::ChatClient;
use playtest::bots::goal::openai::OpenAiClient;
use playtest::bots::{BotOutcome, BotRunState, BotSummary};
use playtest::demo::{DemoScene, DemoScreenshots, MenuDiscoverer};
use playtest::{
    ActiveScene, AutomationController, AutomationHarness, AutomationRecorder, DiscoveryManager,
    FinalizeReport, PlaytestPlugin, PlaytestSettings, RecordingCatalog, Scenario,
    parse_scenario_file,
};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn main() {
    let settings = match PlaytestSettings::from_args() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(2);
        }
    };

    let mut app = App::new();
    app.add_plugins(MinimalPlugins)
        .add_plugins(LogPlugin {
            level: if settings.quiet { Level::WARN } else { Level::INFO },
            ..Default::default()
        })
        .add_plugins(PlaytestPlugin)
        .insert_resource(TimeUpdateStrategy::ManualDuration(Duration::from_secs_f64(
            settings.tick_secs.max(0.0),
        )));

    let scenario = match &settings.scenario {
        Some(path) => parse_scenario_file(Path::new(path)),
        None => Ok(Scenario::random_exploration()),
    };
    let scenario = match scenario {
        Ok(scenario) => scenario,
        Err(e) => {
            error!("{}", e);
            std::process::exit(2);
        }
    };

    let demo = DemoScene::new();
    let controller = match build_controller(&settings, &scenario, &demo) {
        Ok(controller) => controller,
        Err(e) => {
            error!("{}", e);
            std::process::exit(2);
        }
    };
    app.insert_resource(ActiveScene(demo.scene_info()))
        .insert_resource(AutomationHarness::new(controller));

    let max_ticks = scenario.max_ticks.unwrap_or(settings.max_ticks);
    // Goal bots wait on a remote model, so ticks follow the wall clock
    let paced = scenario.has_goal_bots();
    let tick_length = Duration::from_secs_f64(settings.tick_secs.max(0.0));
    info!(
        "Running scenario '{}' for up to {} ticks{}",
        scenario.name,
        max_ticks,
        if paced { " (real time)" } else { "" }
    );

    let started = Instant::now();
    for _ in 0..max_ticks {
        let tick_start = Instant::now();
        app.world_mut().resource_mut::<ActiveScene>().0 = demo.scene_info();
        app.update();

        let mut harness = app.world_mut().resource_mut::<AutomationHarness>();
        if harness.controller().is_finished() {
            info!("All bots finished after {} ticks", harness.frames());
            break;
        }
        if paced && let Some(rest) = tick_length.checked_sub(tick_start.elapsed()) {
            std::thread::sleep(rest);
        }
    }

    let Some(harness) = app.world_mut().remove_resource::<AutomationHarness>() else {
        error!("Automation harness disappeared during the run");
        std::process::exit(2);
    };
    let mut controller = harness.into_controller();
    let summaries = controller.bot_summaries();
    let ticks = controller.ticks();
    let reports = controller.shutdown(settings.drain_timeout());

    if !settings.quiet {
        print_report(&scenario, ticks, started.elapsed(), &summaries, &reports);
    }

    let failed_bot = summaries.iter().any(|s| {
        matches!(
            s.state,
            BotRunState::Finished(BotOutcome::TestFailed(_) | BotOutcome::ProtocolViolation(_))
        )
    });
    let failed_archive = reports.iter().any(|r| !r.is_archived());
    if failed_bot || failed_archive {
        std::process::exit(1);
    }
}

fn build_controller(
    settings: &PlaytestSettings,
    scenario: &Scenario,
    demo: &DemoScene,
) -> Result<AutomationController, String> {
    let base = std::env::current_dir()
        .map_err(|e| format!("Failed to read working directory: {}", e))?;

    let mut recorder = AutomationRecorder::new(settings.recorder_config(&base));
    recorder.set_screenshot_source(DemoScreenshots::new(demo.clone()));
    if let Some(path) = settings.catalog_path(&base) {
        let catalog = RecordingCatalog::open(&path)
            .map_err(|e| format!("Failed to open catalog {}: {}", path.display(), e))?;
        recorder.set_catalog(catalog);
    }

    let mut discovery = DiscoveryManager::new(settings.discovery_mode);
    discovery.add(MenuDiscoverer::new(demo.clone()));
    let mut controller = AutomationController::new(discovery, recorder);

    let client: Option<Arc<dyn ChatClient>> = if scenario.has_goal_bots() {
        let config = settings.chat.openai_config().map_err(|e| e.to_string())?;
        let client = OpenAiClient::new(config).map_err(|e| e.to_string())?;
        info!("Goal bots will use {}", client.endpoint());
        Some(Arc::new(client))
    } else {
        None
    };
    for (bot, interval) in scenario.build_bots(settings.seed, &settings.chat, client)? {
        controller.add_boxed_bot(bot, interval);
    }
    controller.validate().map_err(|e| e.to_string())?;

    if scenario.recording.enabled {
        let save_only_when_changed = scenario
            .recording
            .save_only_when_changed
            .unwrap_or(settings.save_only_when_changed);
        controller
            .recorder_mut()
            .start_recording_with(scenario.session_name(), save_only_when_changed)
            .map_err(|e| format!("Failed to start recording: {}", e))?;
    }
    Ok(controller)
}

fn print_report(
    scenario: &Scenario,
    ticks: u64,
    elapsed: Duration,
    summaries: &[BotSummary],
    reports: &[FinalizeReport],
) {
    println!();
    println!("=== Playtest: {} ===", scenario.name);
    if let Some(description) = &scenario.description {
        println!("{}", description);
    }
    println!("Ticks: {} in {:.1}s", ticks, elapsed.as_secs_f64());

    println!();
    println!("{:<20} {:>11} {:>7}  Result", "Bot", "Activations", "Faults");
    for summary in summaries {
        let result = match &summary.state {
            BotRunState::Running => "still running".to_string(),
            BotRunState::Finished(outcome) => outcome.to_string(),
        };
        println!(
            "{:<20} {:>11} {:>7}  {}",
            summary.name, summary.activations, summary.faults, result
        );
    }

    if reports.is_empty() {
        return;
    }
    println!();
    for report in reports {
        match &report.archive {
            Ok(path) => println!("Recording '{}': {}", report.name, path.display()),
            Err(e) => println!("Recording '{}' FAILED: {}", report.name, e),
        }
        println!(
            "  {} frames, {} snapshots, {} screenshots, {} write failures",
            report.stats.frames_processed,
            report.stats.snapshots_written,
            report.stats.screenshots_written,
            report.stats.write_failures
        );
    }
}
