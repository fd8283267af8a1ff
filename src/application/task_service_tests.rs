use chrono::{Duration, Utc};

use super::task_service::{TaskService, TaskServiceImpl};
use super::test_support::{seed_todos, MemoryStore};
use crate::domain::batch::{BatchError, CreateTaskItem, ReorderItem, UpdateTaskItem};
use crate::domain::todo::{OrderingMode, TodoId};
use crate::domain::user::UserId;

fn service(store: &MemoryStore, mode: OrderingMode) -> TaskServiceImpl<MemoryStore, MemoryStore> {
    TaskServiceImpl::new(store.clone(), store.clone(), mode)
}

fn item(todo: i64, text: &str) -> CreateTaskItem {
    CreateTaskItem {
        task: text.into(),
        completed: false,
        todo_id: TodoId(todo),
        todo_last_added: None,
    }
}

#[tokio::test]
async fn batch_create_counts_per_parent_todo() {
    let store = MemoryStore::new();
    let service = service(&store, OrderingMode::BestEffort);
    let ids = seed_todos(&store, UserId(1), 2).await;
    let created = service
        .batch_create(
            UserId(1),
            vec![
                item(ids[0], "a"),
                item(ids[1], "b"),
                item(ids[0], "c"),
                item(ids[0], "d"),
            ],
        )
        .await
        .unwrap();
    let orderings: Vec<i64> = created.iter().map(|t| t.ordering).collect();
    // interleaved parents each keep their own running counter
    assert_eq!(orderings, vec![1, 1, 2, 3]);
}

#[tokio::test]
async fn batch_create_continues_from_existing_max() {
    let store = MemoryStore::new();
    let service = service(&store, OrderingMode::BestEffort);
    let ids = seed_todos(&store, UserId(1), 1).await;
    service
        .batch_create(UserId(1), vec![item(ids[0], "a"), item(ids[0], "b")])
        .await
        .unwrap();
    let created = service
        .batch_create(UserId(1), vec![item(ids[0], "c")])
        .await
        .unwrap();
    assert_eq!(created[0].ordering, 3);
}

#[tokio::test]
async fn batch_create_serialized_matches_best_effort_numbering() {
    let store = MemoryStore::new();
    let service = service(&store, OrderingMode::Serialized);
    let ids = seed_todos(&store, UserId(1), 1).await;
    let created = service
        .batch_create(UserId(1), vec![item(ids[0], "a"), item(ids[0], "b")])
        .await
        .unwrap();
    let orderings: Vec<i64> = created.iter().map(|t| t.ordering).collect();
    assert_eq!(orderings, vec![1, 2]);
}

#[tokio::test]
async fn last_added_hint_last_write_wins() {
    let store = MemoryStore::new();
    let service = service(&store, OrderingMode::BestEffort);
    let ids = seed_todos(&store, UserId(1), 1).await;
    let t1 = Utc::now() - Duration::hours(2);
    let t2 = Utc::now() - Duration::hours(1);
    service
        .batch_create(
            UserId(1),
            vec![
                CreateTaskItem {
                    task: "first".into(),
                    completed: false,
                    todo_id: TodoId(ids[0]),
                    todo_last_added: Some(t1),
                },
                CreateTaskItem {
                    task: "second".into(),
                    completed: false,
                    todo_id: TodoId(ids[0]),
                    todo_last_added: Some(t2),
                },
            ],
        )
        .await
        .unwrap();
    assert_eq!(store.todo(ids[0]).unwrap().last_added, Some(t2));
}

#[tokio::test]
async fn batch_create_rejects_foreign_parent() {
    let store = MemoryStore::new();
    let service = service(&store, OrderingMode::BestEffort);
    let theirs = seed_todos(&store, UserId(2), 1).await;
    let err = service
        .batch_create(UserId(1), vec![item(theirs[0], "sneaky")])
        .await
        .unwrap_err();
    assert!(matches!(err, BatchError::Persistence(_)));
    assert_eq!(store.task_count(), 0);
}

#[tokio::test]
async fn single_create_stamps_parent_last_added() {
    let store = MemoryStore::new();
    let service = service(&store, OrderingMode::BestEffort);
    let ids = seed_todos(&store, UserId(1), 1).await;
    assert!(store.todo(ids[0]).unwrap().last_added.is_none());
    let task = service.create(UserId(1), item(ids[0], "solo")).await.unwrap();
    assert_eq!(task.ordering, 1);
    assert!(store.todo(ids[0]).unwrap().last_added.is_some());
}

#[tokio::test]
async fn batch_update_writes_union_of_touched_fields() {
    let store = MemoryStore::new();
    let service = service(&store, OrderingMode::BestEffort);
    let ids = seed_todos(&store, UserId(1), 1).await;
    let created = service
        .batch_create(UserId(1), vec![item(ids[0], "a"), item(ids[0], "b")])
        .await
        .unwrap();
    let updated = service
        .batch_update(
            UserId(1),
            vec![
                UpdateTaskItem {
                    id: created[0].id.0,
                    task: Some("renamed".into()),
                    completed: None,
                    ordering: None,
                    todo_last_added: None,
                },
                UpdateTaskItem {
                    id: created[1].id.0,
                    task: None,
                    completed: Some(true),
                    ordering: Some(9),
                    todo_last_added: None,
                },
            ],
        )
        .await
        .unwrap();
    assert_eq!(updated.len(), 2);
    let first = store.task(created[0].id.0).unwrap();
    assert_eq!(first.task, "renamed");
    assert!(!first.completed);
    assert_eq!(first.ordering, 1);
    let second = store.task(created[1].id.0).unwrap();
    assert_eq!(second.task, "b");
    assert!(second.completed);
    assert_eq!(second.ordering, 9);
}

#[tokio::test]
async fn batch_update_flushes_last_added_hints_to_parents() {
    let store = MemoryStore::new();
    let service = service(&store, OrderingMode::BestEffort);
    let ids = seed_todos(&store, UserId(1), 1).await;
    let created = service
        .batch_create(UserId(1), vec![item(ids[0], "a")])
        .await
        .unwrap();
    let stamp = Utc::now() - Duration::minutes(5);
    service
        .batch_update(
            UserId(1),
            vec![UpdateTaskItem {
                id: created[0].id.0,
                task: None,
                completed: Some(true),
                ordering: None,
                todo_last_added: Some(stamp),
            }],
        )
        .await
        .unwrap();
    assert_eq!(store.todo(ids[0]).unwrap().last_added, Some(stamp));
}

#[tokio::test]
async fn reorder_tasks_within_one_todo() {
    let store = MemoryStore::new();
    let service = service(&store, OrderingMode::BestEffort);
    let ids = seed_todos(&store, UserId(1), 1).await;
    let created = service
        .batch_create(UserId(1), vec![item(ids[0], "a"), item(ids[0], "b")])
        .await
        .unwrap();
    let updated = service
        .batch_update_ordering(
            UserId(1),
            vec![
                ReorderItem { id: created[0].id.0, ordering: 2 },
                ReorderItem { id: created[1].id.0, ordering: 1 },
            ],
        )
        .await
        .unwrap();
    assert_eq!(updated.len(), 2);
    assert_eq!(store.task(created[0].id.0).unwrap().ordering, 2);
    assert_eq!(store.task(created[1].id.0).unwrap().ordering, 1);
}

#[tokio::test]
async fn batch_delete_tolerates_unknown_and_foreign_ids() {
    let store = MemoryStore::new();
    let service = service(&store, OrderingMode::BestEffort);
    let mine = seed_todos(&store, UserId(1), 1).await;
    let theirs = seed_todos(&store, UserId(2), 1).await;
    let my_task = service.batch_create(UserId(1), vec![item(mine[0], "mine")]).await.unwrap();
    let their_service = service_for_other(&store);
    let their_task = their_service
        .batch_create(UserId(2), vec![item(theirs[0], "theirs")])
        .await
        .unwrap();

    let deleted = service
        .batch_delete(UserId(1), vec![my_task[0].id.0, their_task[0].id.0, 424_242])
        .await
        .unwrap();
    assert_eq!(deleted.len(), 1);
    assert_eq!(deleted[0].task, "mine");
    assert!(store.task(their_task[0].id.0).is_some());
}

fn service_for_other(store: &MemoryStore) -> TaskServiceImpl<MemoryStore, MemoryStore> {
    TaskServiceImpl::new(store.clone(), store.clone(), OrderingMode::BestEffort)
}
