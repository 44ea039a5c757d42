use std::time::Duration;

use scheduler::events::SchedulerEvent;
use scheduler::host::HostRenderGateway;
use scheduler::scheduler::{JobScheduler, SchedulerConfig, SchedulerStatus};
use scheduler::simulated::{HostCall, SimulatedHost};
use shared::errors::{FrameSpecError, HostError, JobError};
use shared::jobs::{CameraSetting, RenderBatch};
use shared::results::batch_trace::JobOutcome;

fn two_cameras() -> Vec<CameraSetting> {
    vec![
        CameraSetting::new("CamA", "1,2", false),
        CameraSetting::new("CamB", "5-6", true),
    ]
}

fn submitted(host: &SimulatedHost) -> Vec<(String, i64)> {
    host.submitted_renders()
        .iter()
        .map(|render| (render.camera.clone().unwrap_or_default(), render.frame))
        .collect()
}

#[test]
fn starts_every_job_once_in_list_order() {
    let settings = vec![
        CameraSetting::new("Cam0", "1", false),
        CameraSetting::new("Cam1", "", false),
        CameraSetting::new("Cam2", "2-3", false),
        CameraSetting::new("Cam3", "", true),
        CameraSetting::new("Cam4", "9", true),
    ];
    let mut host = SimulatedHost::new("/renders");
    let mut scheduler = JobScheduler::new(settings, SchedulerConfig::default());

    let status = host.run(&mut scheduler).unwrap();
    assert_eq!(status, SchedulerStatus::Finished);

    let trace = scheduler.trace().unwrap();
    let started: Vec<usize> = trace.jobs.iter().map(|job| job.job).collect();
    assert_eq!(started, vec![0, 1, 2, 3, 4]);
    assert!(trace
        .jobs
        .iter()
        .all(|job| job.outcome == JobOutcome::Finished));

    assert_eq!(
        submitted(&host),
        vec![
            ("Cam0".to_string(), 1),
            ("Cam2".to_string(), 2),
            ("Cam2".to_string(), 3),
            ("Cam4".to_string(), 9),
        ]
    );
}

#[test]
fn at_most_one_render_is_outstanding_and_jobs_never_overlap() {
    let mut host = SimulatedHost::new("/renders");
    let mut scheduler = JobScheduler::new(two_cameras(), SchedulerConfig::default());

    let mut status = scheduler.execute(&mut host);
    let mut outstanding = 0;
    let mut last_submission_count = 0;

    while status == SchedulerStatus::Running {
        let event = host.next_event().unwrap();
        if event == SchedulerEvent::RenderComplete {
            outstanding -= 1;
        }

        status = scheduler.handle_event(&mut host, event);

        let submission_count = host.submitted_renders().len();
        outstanding += submission_count - last_submission_count;
        last_submission_count = submission_count;

        assert!(outstanding <= 1, "more than one render outstanding");

        // Later jobs stay queued until the current one is retired.
        if let Some(current) = scheduler.current_job() {
            assert_eq!(scheduler.queued_jobs(), 1 - current.ordinal());
        }
    }

    assert_eq!(status, SchedulerStatus::Finished);
    assert_eq!(outstanding, 0);
}

#[test]
fn tick_waits_while_the_current_job_is_running() {
    let mut host = SimulatedHost::new("/renders").with_render_duration(Duration::from_secs(10));
    let mut scheduler = JobScheduler::new(two_cameras(), SchedulerConfig::default());

    host.run(&mut scheduler).unwrap();

    // Ten-second renders span many ticks, yet the second camera only starts after the first is done.
    let trace = scheduler.trace().unwrap();
    let cam_b_first_frame = trace
        .frames
        .iter()
        .position(|frame| frame.camera == "CamB")
        .unwrap();
    assert!(trace.frames[..cam_b_first_frame]
        .iter()
        .all(|frame| frame.camera == "CamA"));
    assert_eq!(trace.frames.len(), 4);
}

#[test]
fn scene_camera_frame_and_output_path_are_restored() {
    let mut host = SimulatedHost::new("/renders")
        .with_scene_camera("Main")
        .with_scene_frame(100);
    let mut scheduler = JobScheduler::new(two_cameras(), SchedulerConfig::default());

    host.run(&mut scheduler).unwrap();

    assert_eq!(host.camera().as_deref(), Some("Main"));
    assert_eq!(host.current_frame(), 100);
    assert_eq!(host.output_path(), "/renders");

    let calls = host.calls();
    assert!(calls.contains(&HostCall::UnregisterTickSource));
    assert!(calls.contains(&HostCall::UnregisterCancelCallback));
    assert!(!host.events().is_tick_source_registered());
    assert!(!host.events().is_cancel_armed());
}

#[test]
fn cancel_during_render_stops_the_batch_and_restores_output_path() {
    let mut host = SimulatedHost::new("/renders").cancelling_render(0);
    let mut scheduler = JobScheduler::new(two_cameras(), SchedulerConfig::default());

    let status = host.run(&mut scheduler).unwrap();

    assert_eq!(status, SchedulerStatus::Cancelled);
    assert_eq!(submitted(&host), vec![("CamA".to_string(), 1)]);
    assert_eq!(host.output_path(), "/renders");

    let trace = scheduler.trace().unwrap();
    assert!(trace.was_cancelled);
    assert_eq!(trace.jobs.len(), 1);
    assert_eq!(trace.jobs[0].outcome, JobOutcome::Cancelled);
    assert_eq!(trace.jobs[0].frames_discarded, 1);
}

#[test]
fn cancel_after_a_completed_frame_halts_further_frames() {
    let mut host = SimulatedHost::new("/renders");
    let mut scheduler = JobScheduler::new(
        vec![CameraSetting::new("CamA", "1-5", false)],
        SchedulerConfig::default(),
    );

    let mut status = scheduler.execute(&mut host);
    while status == SchedulerStatus::Running {
        let event = host.next_event().unwrap();
        let completed = event == SchedulerEvent::RenderComplete;

        status = scheduler.handle_event(&mut host, event);

        if completed && host.submitted_renders().len() == 2 {
            status = scheduler.handle_event(&mut host, SchedulerEvent::RenderCancelled);
        }
    }

    assert_eq!(status, SchedulerStatus::Cancelled);
    assert_eq!(host.submitted_renders().len(), 2);
    assert_eq!(host.output_path(), "/renders");

    let trace = scheduler.trace().unwrap();
    assert_eq!(trace.jobs[0].frames_discarded, 3);
}

#[test]
fn cancel_between_jobs_is_honoured_on_next_tick() {
    let mut host = SimulatedHost::new("/renders");
    let mut scheduler = JobScheduler::new(two_cameras(), SchedulerConfig::default());

    scheduler.execute(&mut host);
    let status = scheduler.handle_event(&mut host, SchedulerEvent::RenderCancelled);
    assert_eq!(status, SchedulerStatus::Running);

    let status = scheduler.handle_event(&mut host, SchedulerEvent::Tick);
    assert_eq!(status, SchedulerStatus::Cancelled);
    assert!(host.submitted_renders().is_empty());
    assert_eq!(scheduler.queued_jobs(), 0);

    // Late events are ignored.
    let status = scheduler.handle_event(&mut host, SchedulerEvent::Tick);
    assert_eq!(status, SchedulerStatus::Cancelled);
    assert!(host.submitted_renders().is_empty());
}

#[test]
fn failing_job_is_reported_and_the_batch_continues() {
    let settings = vec![
        CameraSetting::new("CamA", "1,x", false),
        CameraSetting::new("CamB", "5-6", false),
    ];
    let mut host = SimulatedHost::new("/renders");
    let mut scheduler = JobScheduler::new(settings, SchedulerConfig::default());

    let status = host.run(&mut scheduler).unwrap();

    assert_eq!(status, SchedulerStatus::Finished);
    assert_eq!(
        submitted(&host),
        vec![("CamB".to_string(), 5), ("CamB".to_string(), 6)]
    );

    let failures = scheduler.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].job, 0);
    assert_eq!(failures[0].camera, "CamA");
    assert_eq!(
        failures[0].error,
        JobError::FrameSpec(FrameSpecError::InvalidFrame {
            token: "x".to_string()
        })
    );
    assert_eq!(host.output_path(), "/renders");
}

#[test]
fn rejected_submission_and_unknown_camera_fail_only_their_job() {
    let settings = vec![
        CameraSetting::new("CamA", "1-3", false),
        CameraSetting::new("Ghost", "1", false),
        CameraSetting::new("CamB", "7", false),
    ];
    let mut host = SimulatedHost::new("/renders")
        .with_known_cameras(["CamA", "CamB"])
        .rejecting_submission(1);
    let mut scheduler = JobScheduler::new(settings, SchedulerConfig::default());

    let status = host.run(&mut scheduler).unwrap();

    assert_eq!(status, SchedulerStatus::Finished);
    assert_eq!(
        submitted(&host),
        vec![
            ("CamA".to_string(), 1),
            ("CamA".to_string(), 2),
            ("CamB".to_string(), 7),
        ]
    );

    let failures = scheduler.failures();
    assert_eq!(failures.len(), 2);
    assert!(matches!(
        failures[0].error,
        JobError::Host(HostError::SubmitFailed { frame: 2, .. })
    ));
    assert_eq!(
        failures[1].error,
        JobError::Host(HostError::UnknownCamera {
            camera: "Ghost".to_string()
        })
    );

    let trace = scheduler.trace().unwrap();
    assert_eq!(trace.jobs[0].frames_discarded, 1);
    assert_eq!(host.output_path(), "/renders");
}

#[test]
fn execute_twice_is_ignored() {
    let mut host = SimulatedHost::new("/renders");
    let mut scheduler = JobScheduler::new(two_cameras(), SchedulerConfig::default());

    assert_eq!(scheduler.execute(&mut host), SchedulerStatus::Running);
    assert_eq!(scheduler.execute(&mut host), SchedulerStatus::Running);

    let registrations = host
        .calls()
        .iter()
        .filter(|call| matches!(call, HostCall::RegisterTickSource(_)))
        .count();
    assert_eq!(registrations, 1);
}

#[test]
fn empty_batch_finishes_on_first_tick() {
    let mut host = SimulatedHost::new("/renders");
    let mut scheduler = JobScheduler::new(Vec::new(), SchedulerConfig::default());

    let status = host.run(&mut scheduler).unwrap();

    assert_eq!(status, SchedulerStatus::Finished);
    assert_eq!(host.now(), Duration::from_secs(1));
}

#[test]
fn batch_timing_configures_the_scheduler() {
    let batch = RenderBatch::from_toml_str(
        r#"
batch_name = "timing"
project_file_path = "scene.blend"
output_directory_path = "/renders"

[timing]
tick_interval_ms = 250
frame_delay_ms = 50

[[cameras]]
camera = "CamA"
frame_ranges = "1-2"
"#,
    )
    .unwrap();

    let mut scheduler = JobScheduler::from_batch(&batch);
    assert_eq!(
        scheduler.config(),
        SchedulerConfig {
            tick_interval: Duration::from_millis(250),
            frame_delay: Duration::from_millis(50),
        }
    );

    let mut host = SimulatedHost::new("/renders");
    host.run(&mut scheduler).unwrap();

    assert!(host
        .calls()
        .contains(&HostCall::RegisterTickSource(Duration::from_millis(250))));
    assert_eq!(host.submitted_renders().len(), 2);
}

#[test]
fn lost_render_notification_is_reported_as_a_stall() {
    let mut host = SimulatedHost::new("/renders").cancelling_render(0);
    let mut scheduler = JobScheduler::new(two_cameras(), SchedulerConfig::default());

    // Without a cancel callback the cancelled render is never reported back.
    scheduler.execute(&mut host);
    host.unregister_cancel_callback();

    let error = host.run(&mut scheduler).unwrap_err();

    assert!(error.to_string().contains("stalled"));
    assert_eq!(host.submitted_renders().len(), 1);
    assert_eq!(scheduler.status(), SchedulerStatus::Running);
}
