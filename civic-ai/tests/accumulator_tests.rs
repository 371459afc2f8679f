//! Concurrent document accumulation against a shared request

mod helpers;

use std::collections::HashSet;

use civic_ai::db::requests::{self, GenerationClaim};
use civic_ai::models::{Document, Problem, ProblemDescription};
use civic_ai::services::Accumulator;
use civic_ai::PipelineError;
use helpers::{drain_events, TestEnv};
use uuid::Uuid;

fn complaint(ward: &str) -> Document {
    Document {
        id: Uuid::new_v4(),
        name: "Mohan".to_string(),
        ward: Some(ward.to_string()),
        phone_number: None,
        country_code: "+91".to_string(),
        image_url: "/generated/page-1.jpg".to_string(),
        doc_url: "/uploads/pdf/batch.pdf".to_string(),
        issues: vec!["water".to_string()],
        problems: vec![Problem {
            id: Uuid::new_v4(),
            category: vec!["water".to_string()],
            description: ProblemDescription {
                english: "No water supply".to_string(),
                hindi: "पानी नहीं आता".to_string(),
            },
        }],
    }
}

#[tokio::test]
async fn test_concurrent_batches_are_all_kept() {
    let env = TestEnv::new().await;
    let request = env.create_request("user-1", &["batch"]).await;
    assert_eq!(
        requests::try_begin_generation(&env.pool, request.id).await.unwrap(),
        GenerationClaim::Acquired
    );

    let accumulator = Accumulator::new(env.pool.clone(), env.event_bus.clone());
    let mut rx = env.event_bus.subscribe();

    let batches: Vec<Vec<Document>> = (0..10)
        .map(|i| (0..3).map(|_| complaint(&format!("Ward {}", i))).collect())
        .collect();
    let expected: HashSet<Uuid> = batches.iter().flatten().map(|d| d.id).collect();

    let tasks = batches.into_iter().map(|batch| {
        let accumulator = accumulator.clone();
        tokio::spawn(async move { accumulator.append(request.id, "user-1", &batch).await })
    });
    let counts: Vec<usize> = futures::future::join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    // Each append observes a distinct running total
    let distinct: HashSet<usize> = counts.iter().copied().collect();
    assert_eq!(distinct.len(), 10);
    assert_eq!(counts.iter().max(), Some(&30));

    let stored = requests::get_request(&env.pool, request.id).await.unwrap().unwrap();
    assert_eq!(stored.document_count, 30);
    let kept: HashSet<Uuid> = stored.documents.iter().map(|d| d.id).collect();
    assert_eq!(kept, expected);

    assert_eq!(drain_events(&mut rx).len(), 10);
}

#[tokio::test]
async fn test_append_requires_generation_in_progress() {
    let env = TestEnv::new().await;
    let request = env.create_request("user-1", &["batch"]).await;
    let accumulator = Accumulator::new(env.pool.clone(), env.event_bus.clone());
    let mut rx = env.event_bus.subscribe();

    let err = accumulator
        .append(request.id, "user-1", &[complaint("Ward 1")])
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::PersistenceConflict(id) if id == request.id));

    let stored = requests::get_request(&env.pool, request.id).await.unwrap().unwrap();
    assert_eq!(stored.document_count, 0);
    assert!(drain_events(&mut rx).is_empty());
}

#[tokio::test]
async fn test_empty_batch_reports_current_count() {
    let env = TestEnv::new().await;
    let request = env.create_request("user-1", &["batch"]).await;
    requests::try_begin_generation(&env.pool, request.id).await.unwrap();
    let accumulator = Accumulator::new(env.pool.clone(), env.event_bus.clone());

    accumulator
        .append(request.id, "user-1", &[complaint("Ward 1"), complaint("Ward 2")])
        .await
        .unwrap();
    let count = accumulator.append(request.id, "user-1", &[]).await.unwrap();
    assert_eq!(count, 2);
}
