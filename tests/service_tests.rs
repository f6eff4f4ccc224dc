use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::mpsc;
use uuid::Uuid;

use cronman::error::CronmanError;
use cronman::scheduler::{JobRun, Scheduler, SchedulerHandle};
use cronman::service::{CreateJob, JobService, UpdateJob};
use cronman::store::JobStore;

struct Fixture {
    service: JobService,
    store: Arc<JobStore>,
    scheduler: SchedulerHandle,
    scheduler_task: tokio::task::JoinHandle<()>,
    _run_rx: mpsc::Receiver<JobRun>,
    _dir: TempDir,
}

async fn fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(JobStore::new(dir.path().join("jobs.json")));
    let (run_tx, run_rx) = mpsc::channel(50);
    let (scheduler, handle) = Scheduler::new(vec![], run_tx, store.clone(), Some(chrono_tz::UTC));
    let scheduler_task = tokio::spawn(scheduler.run());
    Fixture {
        service: JobService::new(store.clone(), handle.clone()),
        store,
        scheduler: handle,
        scheduler_task,
        _run_rx: run_rx,
        _dir: dir,
    }
}

fn echo_request() -> CreateJob {
    CreateJob {
        command: "/bin/echo".to_string(),
        args: vec!["hi".to_string()],
        cron_expr: "* * * * *".to_string(),
        run_as_user: String::new(),
    }
}

#[tokio::test]
async fn test_create_assigns_uuid_and_persists() {
    let fx = fixture().await;

    let job = fx.service.create(echo_request()).await.unwrap();
    assert!(Uuid::parse_str(&job.id).is_ok(), "id must be a UUID");

    let stored = fx.service.get(&job.id).await.unwrap();
    assert_eq!(stored.command, "/bin/echo");
    assert_eq!(stored.args, vec!["hi"]);
}

#[tokio::test]
async fn test_create_ids_are_unique() {
    let fx = fixture().await;

    for _ in 0..10 {
        fx.service.create(echo_request()).await.unwrap();
    }
    let jobs = fx.service.list().await.unwrap();
    assert_eq!(jobs.len(), 10, "every create must get a distinct id");
}

#[tokio::test]
async fn test_create_rejects_empty_command() {
    let fx = fixture().await;

    let mut request = echo_request();
    request.command = String::new();
    let err = fx.service.create(request).await.unwrap_err();
    assert!(err.to_string().contains("Command is not specified"));
    assert!(fx.service.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_create_rejects_bad_cron() {
    let fx = fixture().await;

    let mut request = echo_request();
    request.cron_expr = "not a cron".to_string();
    let err = fx.service.create(request).await.unwrap_err();
    assert!(matches!(err, CronmanError::BadCron { .. }));
    assert!(fx.service.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_persistence_survives_scheduler_stop() {
    let fx = fixture().await;

    let job = fx.service.create(echo_request()).await.unwrap();

    fx.scheduler.stop();
    fx.scheduler_task.await.unwrap();

    let loaded = fx.store.load().await.unwrap();
    assert!(loaded.contains_key(&job.id));
}

#[tokio::test]
async fn test_create_after_stop_is_unavailable_and_rolled_back() {
    let fx = fixture().await;

    fx.scheduler.stop();
    fx.scheduler_task.await.unwrap();

    let err = fx.service.create(echo_request()).await.unwrap_err();
    assert!(matches!(err, CronmanError::Unavailable));
    assert!(
        fx.store.load().await.unwrap().is_empty(),
        "a job the scheduler never saw must not stay on disk"
    );
}

#[tokio::test]
async fn test_update_overlays_only_supplied_fields() {
    let fx = fixture().await;
    let job = fx.service.create(echo_request()).await.unwrap();

    let updated = fx
        .service
        .update(
            &job.id,
            UpdateJob {
                cron_expr: Some("*/5 * * * *".to_string()),
                ..UpdateJob::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.cron_expr, "*/5 * * * *");
    assert_eq!(updated.command, "/bin/echo", "untouched fields must persist");
    assert_eq!(updated.args, vec!["hi"]);

    // The schedule entry was replaced: the persisted next run realigns to
    // the new expression within a settle window.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let stored = fx.store.load().await.unwrap();
        if let Some(next) = stored.get(&job.id).and_then(|j| j.next_run) {
            use chrono::Timelike;
            if next.minute() % 5 == 0 && next.second() == 0 {
                break;
            }
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "next_run never aligned to the new schedule"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn test_update_empty_fields_keep_stored_values() {
    let fx = fixture().await;
    let job = fx.service.create(echo_request()).await.unwrap();

    let updated = fx
        .service
        .update(
            &job.id,
            UpdateJob {
                command: Some(String::new()),
                ..UpdateJob::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.command, "/bin/echo");
}

#[tokio::test]
async fn test_update_missing_job_is_not_found() {
    let fx = fixture().await;
    let err = fx
        .service
        .update("ghost", UpdateJob::default())
        .await
        .unwrap_err();
    assert!(matches!(err, CronmanError::JobNotFound(_)));
    assert!(err.to_string().contains("ghost"));
}

#[tokio::test]
async fn test_update_rejects_bad_cron_patch() {
    let fx = fixture().await;
    let job = fx.service.create(echo_request()).await.unwrap();

    let err = fx
        .service
        .update(
            &job.id,
            UpdateJob {
                cron_expr: Some("bogus expr here no".to_string()),
                ..UpdateJob::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CronmanError::BadCron { .. }));

    let stored = fx.service.get(&job.id).await.unwrap();
    assert_eq!(stored.cron_expr, "* * * * *", "a rejected patch must not persist");
}

#[tokio::test]
async fn test_delete_removes_from_disk() {
    let fx = fixture().await;
    let job = fx.service.create(echo_request()).await.unwrap();

    fx.service.delete(&job.id).await.unwrap();

    let err = fx.service.get(&job.id).await.unwrap_err();
    assert!(matches!(err, CronmanError::JobNotFound(_)));
    assert!(!fx.store.load().await.unwrap().contains_key(&job.id));
}

#[tokio::test]
async fn test_delete_missing_job_is_not_found() {
    let fx = fixture().await;
    let err = fx.service.delete("ghost").await.unwrap_err();
    assert!(matches!(err, CronmanError::JobNotFound(_)));
}
