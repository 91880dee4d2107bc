use std::sync::Arc;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use anchor_align::config::ControllerConfig;
use anchor_align::relocalization::GpsFix;
use anchor_align::sim::{
    RecordingConsumer, Scenario, ScriptedFrameSource, SimulatedRelocalizationService,
    SimulatedTracker, StaticGps,
};
use anchor_align::system::{AnchorAlignmentController, Collaborators, ManualClock};

const OBJECT_ID: u32 = 1;
const FRAME_PERIOD: f64 = 0.1;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let duration: f64 = std::env::args()
        .nth(1)
        .map(|arg| arg.parse::<f64>())
        .transpose()?
        .unwrap_or(8.0);

    let scenario = Scenario::default();
    let clock = Arc::new(ManualClock::new(0.0));
    let tracker = Arc::new(SimulatedTracker::new());
    let frames = Arc::new(ScriptedFrameSource::new());
    let gps = Arc::new(StaticGps::new(None));
    let service = Arc::new(SimulatedRelocalizationService::new(scenario.clone()));
    let consumer = Arc::new(RecordingConsumer::new());

    let mut config = ControllerConfig::default();
    config.relocalization.max_image_dimension = 160;

    let controller = AnchorAlignmentController::start_manual(
        config,
        Collaborators {
            tracker: tracker.clone(),
            frames: frames.clone(),
            gps: gps.clone(),
            service,
            consumer: consumer.clone(),
            clock: clock.clone(),
        },
    )?;

    tracker.emit_found(0.0, vec![OBJECT_ID]);

    let steps = (duration / FRAME_PERIOD).round() as usize;
    let mut reported_events = 0;
    for i in 0..steps {
        let t = i as f64 * FRAME_PERIOD;
        clock.set(t);
        if i == 5 {
            gps.set(Some(GpsFix {
                latitude: 47.3769,
                longitude: 8.5417,
            }));
        }

        frames.push(scenario.frame(t));
        tracker.emit_pose(t, scenario.world_t_camera(t), 0);
        let outcome = controller.step()?;

        for event in &consumer.events()[reported_events..] {
            println!("t={:.2}  {:?} {:?}", event.timestamp, event.kind, event.object_ids);
        }
        reported_events = consumer.events().len();

        let samples = consumer.samples();
        let Some(sample) = samples.last().filter(|s| !s.is_empty()) else {
            println!("t={:.2}  no anchor ({:?})", t, outcome.relocalization);
            continue;
        };
        let truth = scenario.anchor_t_camera(t).translation;
        let position = sample.positions[0];
        println!(
            "t={:.2}  anchor position [{:.3}, {:.3}, {:.3}]  error {:.4} m  bridge features {}",
            t,
            position.x,
            position.y,
            position.z,
            (position - truth).norm(),
            sample.metadata.bridge_feature_count,
        );
    }

    let stats = controller.stats();
    println!(
        "Done! {} requests, {} successful, {} bridged frames, recovered scale {:?} (true {:.3})",
        stats.requests_sent,
        stats.successful_requests,
        stats.bridge_frames,
        stats.recovered_scale,
        scenario.anchor_t_world.scale,
    );

    Ok(())
}
