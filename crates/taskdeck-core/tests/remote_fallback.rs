use std::net::TcpListener;
use std::path::Path;
use std::sync::Arc;

use serde_json::{Value, json};
use taskdeck_core::backend::LocalBackend;
use taskdeck_core::connectivity::ConnectivityPolicy;
use taskdeck_core::data::TaskManager;
use taskdeck_core::ids::SequentialIds;
use taskdeck_core::local_store::LocalStore;
use taskdeck_core::model::{NewProject, NewTask, ProjectPatch, Status, TaskPatch, TaskQuery};
use taskdeck_core::remote::{DEFAULT_TIMEOUT, RemoteBackend};
use tempfile::tempdir;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn manager_for(server: &MockServer, dir: &Path) -> TaskManager {
    let store = LocalStore::open(dir).expect("open store");
    let local = LocalBackend::with_ids(store, Arc::new(SequentialIds::new("local")));
    let remote =
        RemoteBackend::new(&format!("{}/api", server.uri()), DEFAULT_TIMEOUT).expect("remote");
    TaskManager::new(remote, local, ConnectivityPolicy::new())
}

async fn mount_health(server: &MockServer, status: u16) {
    Mock::given(method("GET"))
        .and(path("/api/health"))
        .respond_with(ResponseTemplate::new(status).set_body_json(json!({ "status": "ok" })))
        .expect(1)
        .mount(server)
        .await;
}

fn api_project(id: i64, name: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "description": null,
        "color": "#ff8800",
        "created_at": "2024-03-01T10:00:00",
        "task_count": 0
    })
}

fn api_task(id: i64, project_id: i64, title: &str, due: Option<&str>) -> Value {
    json!({
        "id": id,
        "project_id": project_id,
        "title": title,
        "description": "",
        "status": "pending",
        "priority": "medium",
        "due_date": due,
        "reminder_date": null,
        "order": 0,
        "created_at": "2024-03-01T10:00:00",
        "updated_at": "2024-03-01T10:00:00"
    })
}

#[tokio::test]
async fn remote_results_are_mirrored_locally() {
    let server = MockServer::start().await;
    mount_health(&server, 200).await;
    Mock::given(method("POST"))
        .and(path("/api/projects"))
        .and(body_json(json!({ "name": "Work" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(api_project(1, "Work")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/tasks"))
        .respond_with(ResponseTemplate::new(201).set_body_json(api_task(
            10,
            1,
            "Report",
            Some("2024-03-05T09:00:00"),
        )))
        .expect(1)
        .mount(&server)
        .await;

    let temp = tempdir().expect("tempdir");
    let mut manager = manager_for(&server, temp.path());

    let project = manager
        .create_project(NewProject {
            name: "Work".to_string(),
            ..NewProject::default()
        })
        .await;
    assert_eq!(project.id, "1");
    assert_eq!(project.task_count, Some(0));

    let task = manager
        .create_task(NewTask {
            project_id: project.id.clone(),
            title: "Report".to_string(),
            ..NewTask::default()
        })
        .await;
    assert_eq!(task.id, "10");
    assert_eq!(task.project_id, "1");
    assert!(manager.connectivity().is_online());

    let (projects, tasks) = LocalStore::open(temp.path()).expect("reopen").load();
    assert_eq!(projects, vec![project]);
    assert_eq!(tasks, vec![task]);
}

#[tokio::test]
async fn failure_mid_session_switches_to_local_for_good() {
    let server = MockServer::start().await;
    mount_health(&server, 200).await;
    Mock::given(method("GET"))
        .and(path("/api/projects"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/projects"))
        .respond_with(ResponseTemplate::new(201).set_body_json(api_project(1, "Never")))
        .expect(0)
        .mount(&server)
        .await;

    let temp = tempdir().expect("tempdir");
    let mut manager = manager_for(&server, temp.path());

    assert!(manager.list_projects().await.is_empty());
    assert!(!manager.connectivity().is_online());

    let project = manager
        .create_project(NewProject {
            name: "Offline".to_string(),
            ..NewProject::default()
        })
        .await;
    assert_eq!(project.id, "local-1");
    assert_eq!(manager.list_projects().await, vec![project]);
}

#[tokio::test]
async fn unreachable_health_keeps_everything_local() {
    let server = MockServer::start().await;
    mount_health(&server, 503).await;
    Mock::given(method("GET"))
        .and(path("/api/tasks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;

    let temp = tempdir().expect("tempdir");
    let mut manager = manager_for(&server, temp.path());

    assert!(!manager.refresh().await);
    let project = manager
        .create_project(NewProject {
            name: "Local".to_string(),
            ..NewProject::default()
        })
        .await;
    let task = manager
        .create_task(NewTask {
            project_id: project.id.clone(),
            title: "Local only".to_string(),
            ..NewTask::default()
        })
        .await;
    assert_eq!(manager.list_tasks(&TaskQuery::default()).await, vec![task]);
}

#[tokio::test]
async fn refresh_replaces_the_local_mirror() {
    let server = MockServer::start().await;
    mount_health(&server, 200).await;
    Mock::given(method("GET"))
        .and(path("/api/projects"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([api_project(1, "Work")])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/tasks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            api_task(10, 1, "Report", None),
            api_task(11, 1, "Slides", Some("2024-03-06T14:30:00")),
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let temp = tempdir().expect("tempdir");
    {
        // Stale data from an earlier offline session.
        let store = LocalStore::open(temp.path()).expect("open store");
        let mut stale = LocalBackend::with_ids(store, Arc::new(SequentialIds::new("old")));
        stale.upsert_task(taskdeck_core::model::Task::from_new(
            "old-1".to_string(),
            NewTask {
                project_id: "p".to_string(),
                title: "stale".to_string(),
                ..NewTask::default()
            },
            chrono::Utc::now(),
        ));
    }

    let mut manager = manager_for(&server, temp.path());
    assert!(manager.refresh().await);

    let titles: Vec<&str> = manager.tasks().iter().map(|t| t.title.as_str()).collect();
    assert_eq!(titles, vec!["Report", "Slides"]);
    assert_eq!(manager.projects().len(), 1);
}

#[tokio::test]
async fn filtered_lists_send_only_set_parameters() {
    let server = MockServer::start().await;
    mount_health(&server, 200).await;
    Mock::given(method("GET"))
        .and(path("/api/tasks"))
        .and(query_param("project_id", "1"))
        .and(query_param("status", "completed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let temp = tempdir().expect("tempdir");
    let mut manager = manager_for(&server, temp.path());

    let query = TaskQuery {
        status: Some(Status::Completed),
        ..TaskQuery::for_project("1")
    };
    assert!(manager.list_tasks(&query).await.is_empty());
    assert!(manager.connectivity().is_online());

    let requests = server.received_requests().await.expect("recording enabled");
    let listed = requests
        .iter()
        .find(|r| r.url.path() == "/api/tasks")
        .expect("tasks request");
    assert_eq!(listed.url.query(), Some("project_id=1&status=completed"));
}

#[tokio::test]
async fn delete_reorder_and_toggle_use_the_api_and_mirror() {
    let server = MockServer::start().await;
    mount_health(&server, 200).await;
    Mock::given(method("GET"))
        .and(path("/api/tasks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            api_task(1, 5, "one", None),
            api_task(2, 5, "two", None),
            api_task(3, 6, "three", None),
        ])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/tasks/reorder"))
        .and(body_json(json!({ "task_ids": [2, 1] })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "message": "ok" })))
        .expect(1)
        .mount(&server)
        .await;
    let mut toggled = api_task(3, 6, "three", None);
    toggled["status"] = json!("completed");
    Mock::given(method("PUT"))
        .and(path("/api/tasks/toggle/3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(toggled))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/projects/5"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let temp = tempdir().expect("tempdir");
    let mut manager = manager_for(&server, temp.path());
    assert_eq!(manager.list_tasks(&TaskQuery::default()).await.len(), 3);

    manager.reorder(&["2".to_string(), "1".to_string()]).await;
    let order: Vec<(&str, i64)> = manager
        .tasks()
        .iter()
        .map(|t| (t.id.as_str(), t.order))
        .collect();
    assert_eq!(order, vec![("1", 1), ("2", 0), ("3", 0)]);

    let task = manager.toggle_status("3").await.expect("toggled");
    assert_eq!(task.status, Status::Completed);

    manager.delete_project("5").await;
    assert!(manager.connectivity().is_online());
    let remaining: Vec<&str> = manager.tasks().iter().map(|t| t.id.as_str()).collect();
    assert_eq!(remaining, vec!["3"]);
    assert_eq!(manager.tasks()[0].status, Status::Completed);
}

#[tokio::test]
async fn calendar_month_accepts_a_wrapped_body() {
    let server = MockServer::start().await;
    mount_health(&server, 200).await;
    Mock::given(method("GET"))
        .and(path("/api/calendar/month/2024/3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "tasks": [api_task(4, 1, "Dentist", Some("2024-03-15T09:30:00"))]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let temp = tempdir().expect("tempdir");
    let mut manager = manager_for(&server, temp.path());

    let tasks = manager.month_tasks(2024, 3).await;
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].title, "Dentist");
    assert_eq!(manager.tasks(), tasks.as_slice());
}

#[tokio::test]
async fn missing_remote_record_falls_back() {
    let server = MockServer::start().await;
    mount_health(&server, 200).await;
    Mock::given(method("PUT"))
        .and(path("/api/tasks/toggle/99"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let temp = tempdir().expect("tempdir");
    let mut manager = manager_for(&server, temp.path());

    assert!(manager.toggle_status("99").await.is_none());
    assert!(!manager.connectivity().is_online());
}

async fn mount_listing(server: &MockServer, projects: Value, tasks: Value) {
    Mock::given(method("GET"))
        .and(path("/api/projects"))
        .respond_with(ResponseTemplate::new(200).set_body_json(projects))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/tasks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(tasks))
        .mount(server)
        .await;
}

#[tokio::test]
async fn project_update_is_sent_as_a_partial_put() {
    let server = MockServer::start().await;
    mount_health(&server, 200).await;
    mount_listing(&server, json!([api_project(1, "Work")]), json!([])).await;
    Mock::given(method("PUT"))
        .and(path("/api/projects/1"))
        .and(body_json(json!({ "name": "Renamed" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(api_project(1, "Renamed")))
        .expect(1)
        .mount(&server)
        .await;

    let temp = tempdir().expect("tempdir");
    let mut manager = manager_for(&server, temp.path());
    assert!(manager.refresh().await);

    let patch = ProjectPatch {
        name: Some("Renamed".to_string()),
        ..ProjectPatch::default()
    };
    let project = manager.update_project("1", patch).await.expect("updated");
    assert_eq!(project.name, "Renamed");
    assert!(manager.connectivity().is_online());

    let (projects, _) = LocalStore::open(temp.path()).expect("reopen").load();
    assert_eq!(projects, vec![project]);
}

#[tokio::test]
async fn clearing_a_due_date_sends_null_and_mirrors_the_result() {
    let server = MockServer::start().await;
    mount_health(&server, 200).await;
    mount_listing(
        &server,
        json!([api_project(1, "Work")]),
        json!([api_task(10, 1, "Report", Some("2024-03-05T09:00:00"))]),
    )
    .await;
    Mock::given(method("PUT"))
        .and(path("/api/tasks/10"))
        .and(body_json(json!({ "title": "Report v2", "due_date": null })))
        .respond_with(ResponseTemplate::new(200).set_body_json(api_task(
            10,
            1,
            "Report v2",
            None,
        )))
        .expect(1)
        .mount(&server)
        .await;

    let temp = tempdir().expect("tempdir");
    let mut manager = manager_for(&server, temp.path());
    assert!(manager.refresh().await);
    assert!(manager.tasks()[0].due_date.is_some());

    let patch = TaskPatch {
        title: Some("Report v2".to_string()),
        due_date: Some(None),
        ..TaskPatch::default()
    };
    let task = manager.update_task("10", patch).await.expect("updated");
    assert_eq!(task.title, "Report v2");
    assert!(task.due_date.is_none());

    let requests = server.received_requests().await.expect("recording enabled");
    let put = requests
        .iter()
        .find(|r| r.url.path() == "/api/tasks/10")
        .expect("put request");
    let sent: Value = serde_json::from_slice(&put.body).expect("json body");
    assert_eq!(sent.get("due_date"), Some(&Value::Null));

    let (_, tasks) = LocalStore::open(temp.path()).expect("reopen").load();
    assert_eq!(tasks, vec![task]);
}

#[tokio::test]
async fn deleted_task_is_removed_from_the_mirror() {
    let server = MockServer::start().await;
    mount_health(&server, 200).await;
    mount_listing(
        &server,
        json!([api_project(1, "Work")]),
        json!([
            api_task(10, 1, "Report", None),
            api_task(11, 1, "Slides", None),
        ]),
    )
    .await;
    Mock::given(method("DELETE"))
        .and(path("/api/tasks/10"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let temp = tempdir().expect("tempdir");
    let mut manager = manager_for(&server, temp.path());
    assert!(manager.refresh().await);

    manager.delete_task("10").await;
    assert!(manager.connectivity().is_online());

    let (_, tasks) = LocalStore::open(temp.path()).expect("reopen").load();
    let ids: Vec<&str> = tasks.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, vec!["11"]);
    assert_eq!(manager.tasks(), tasks.as_slice());
}

#[tokio::test]
async fn calendar_week_uses_the_year_and_week_path() {
    let server = MockServer::start().await;
    mount_health(&server, 200).await;
    Mock::given(method("GET"))
        .and(path("/api/calendar/week/2024/10"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            api_task(7, 1, "Standup", Some("2024-03-04T09:00:00")),
            api_task(8, 1, "Retro", Some("2024-03-08T16:00:00")),
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let temp = tempdir().expect("tempdir");
    let mut manager = manager_for(&server, temp.path());

    let week = manager.week_tasks(2024, 10).await;
    let titles: Vec<&str> = week.iter().map(|t| t.title.as_str()).collect();
    assert_eq!(titles, vec!["Standup", "Retro"]);
    assert!(manager.connectivity().is_online());

    let (_, tasks) = LocalStore::open(temp.path()).expect("reopen").load();
    assert_eq!(tasks, week);
}

#[tokio::test]
async fn refused_connection_counts_as_offline() {
    // Grab a free port, then close it so nothing is listening there.
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        listener.local_addr().expect("addr").port()
    };

    let temp = tempdir().expect("tempdir");
    let store = LocalStore::open(temp.path()).expect("open store");
    let local = LocalBackend::with_ids(store, Arc::new(SequentialIds::new("local")));
    let remote = RemoteBackend::new(&format!("http://127.0.0.1:{port}/api"), DEFAULT_TIMEOUT)
        .expect("remote");
    let mut manager = TaskManager::new(remote, local, ConnectivityPolicy::new());

    assert!(!manager.refresh().await);
    assert!(manager.connectivity().is_checked());
    assert!(!manager.connectivity().is_online());

    let project = manager
        .create_project(NewProject {
            name: "Offline".to_string(),
            ..NewProject::default()
        })
        .await;
    assert_eq!(project.id, "local-1");
    assert_eq!(manager.list_projects().await, vec![project]);
}
