//! Report database operations
//!
//! All three reports of a run are written in one transaction, and only while
//! the request is still held by the run. Groupings are re-checked against the
//! stored documents inside that transaction, so a report that is not an exact
//! partition of the request's problems is never persisted.

use civic_common::{Error, Result};
use serde::Serialize;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use uuid::Uuid;

use super::{parse_timestamp, parse_uuid};
use crate::models::{CommonProblemReport, Document, WardAnalysisReport, WardReport};
use crate::services::partition::{verify_common_groups, verify_ward_groups, ProblemSet};

/// The reports currently stored for a request
#[derive(Debug, Clone, Default, Serialize)]
pub struct RequestReports {
    pub common_problems: Option<CommonProblemReport>,
    pub wards: Option<WardReport>,
    pub ward_analysis: Option<WardAnalysisReport>,
}

/// Outcome of persisting a run's reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved,
    /// The request is no longer `inProgress`; nothing was written
    NotHeld,
}

/// Upsert the three reports of a run atomically
///
/// Fails with `InvalidInput` when either grouping does not partition the
/// stored problem set.
pub async fn save_reports(
    pool: &SqlitePool,
    common: &CommonProblemReport,
    wards: &WardReport,
    analysis: &WardAnalysisReport,
) -> Result<SaveOutcome> {
    let request_id = common.request_id;
    if wards.request_id != request_id || analysis.request_id != request_id {
        return Err(Error::InvalidInput(
            "reports belong to different requests".to_string(),
        ));
    }

    let mut tx = pool.begin().await?;

    let row = sqlx::query(
        "SELECT documents FROM requests WHERE id = ? AND generation_status = 'inProgress'",
    )
    .bind(request_id.to_string())
    .fetch_optional(&mut *tx)
    .await?;

    let Some(row) = row else {
        tx.rollback().await?;
        return Ok(SaveOutcome::NotHeld);
    };

    let documents: String = row.get("documents");
    let documents: Vec<Document> = serde_json::from_str(&documents)?;
    let set = ProblemSet::from_documents(&documents);

    verify_common_groups(&set, &common.common_problems)
        .map_err(|e| Error::InvalidInput(format!("common problem report: {}", e)))?;
    verify_ward_groups(&set, &wards.wards)
        .map_err(|e| Error::InvalidInput(format!("ward report: {}", e)))?;

    upsert(
        &mut tx,
        "common_problem_reports",
        "common_problems",
        common.id,
        request_id,
        &serde_json::to_string(&common.common_problems)?,
        &common.created_at.to_rfc3339(),
    )
    .await?;
    upsert(
        &mut tx,
        "ward_reports",
        "wards",
        wards.id,
        request_id,
        &serde_json::to_string(&wards.wards)?,
        &wards.created_at.to_rfc3339(),
    )
    .await?;
    upsert(
        &mut tx,
        "ward_analysis_reports",
        "wards",
        analysis.id,
        request_id,
        &serde_json::to_string(&analysis.wards)?,
        &analysis.created_at.to_rfc3339(),
    )
    .await?;

    tx.commit().await?;
    Ok(SaveOutcome::Saved)
}

async fn upsert(
    tx: &mut Transaction<'_, Sqlite>,
    table: &str,
    payload_column: &str,
    id: Uuid,
    request_id: Uuid,
    payload: &str,
    created_at: &str,
) -> Result<()> {
    let sql = format!(
        r#"
        INSERT INTO {table} (id, request_id, {payload_column}, created_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(request_id) DO UPDATE SET
            id = excluded.id,
            {payload_column} = excluded.{payload_column},
            created_at = excluded.created_at
        "#
    );

    sqlx::query(&sql)
        .bind(id.to_string())
        .bind(request_id.to_string())
        .bind(payload)
        .bind(created_at)
        .execute(&mut **tx)
        .await?;

    Ok(())
}

/// Load whichever reports exist for a request
pub async fn get_reports(pool: &SqlitePool, request_id: Uuid) -> Result<RequestReports> {
    let key = request_id.to_string();

    let common = sqlx::query(
        "SELECT id, common_problems, created_at FROM common_problem_reports WHERE request_id = ?",
    )
    .bind(&key)
    .fetch_optional(pool)
    .await?
    .map(|row| -> Result<CommonProblemReport> {
        let id: String = row.get("id");
        let body: String = row.get("common_problems");
        let created_at: String = row.get("created_at");
        Ok(CommonProblemReport {
            id: parse_uuid("id", &id)?,
            request_id,
            common_problems: serde_json::from_str(&body)?,
            created_at: parse_timestamp("created_at", &created_at)?,
        })
    })
    .transpose()?;

    let wards = sqlx::query("SELECT id, wards, created_at FROM ward_reports WHERE request_id = ?")
        .bind(&key)
        .fetch_optional(pool)
        .await?
        .map(|row| -> Result<WardReport> {
            let id: String = row.get("id");
            let body: String = row.get("wards");
            let created_at: String = row.get("created_at");
            Ok(WardReport {
                id: parse_uuid("id", &id)?,
                request_id,
                wards: serde_json::from_str(&body)?,
                created_at: parse_timestamp("created_at", &created_at)?,
            })
        })
        .transpose()?;

    let ward_analysis = sqlx::query(
        "SELECT id, wards, created_at FROM ward_analysis_reports WHERE request_id = ?",
    )
    .bind(&key)
    .fetch_optional(pool)
    .await?
    .map(|row| -> Result<WardAnalysisReport> {
        let id: String = row.get("id");
        let body: String = row.get("wards");
        let created_at: String = row.get("created_at");
        Ok(WardAnalysisReport {
            id: parse_uuid("id", &id)?,
            request_id,
            wards: serde_json::from_str(&body)?,
            created_at: parse_timestamp("created_at", &created_at)?,
        })
    })
    .transpose()?;

    Ok(RequestReports {
        common_problems: common,
        wards,
        ward_analysis,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{init_database_pool, requests};
    use crate::models::{
        CommonProblemGroup, NewRequest, Problem, ProblemDescription, ProblemRef, Request,
        WardGroup, WardProblemGroup, WardTally,
    };

    async fn held_request_with_problem() -> (tempfile::TempDir, SqlitePool, Uuid, ProblemRef) {
        let temp_dir = tempfile::tempdir().unwrap();
        let pool = init_database_pool(&temp_dir.path().join("civic.db"))
            .await
            .unwrap();

        let request = Request::new(NewRequest {
            title: "T".to_string(),
            description: "D".to_string(),
            pdf: vec!["/a.pdf".to_string()],
            created_by: "u1".to_string(),
        });
        requests::create_request(&pool, &request).await.unwrap();
        requests::try_begin_generation(&pool, request.id).await.unwrap();

        let doc = Document {
            id: Uuid::new_v4(),
            name: "N".to_string(),
            ward: Some("3".to_string()),
            phone_number: None,
            country_code: "+91".to_string(),
            image_url: "/img.jpg".to_string(),
            doc_url: "/a.pdf".to_string(),
            issues: vec!["water".to_string()],
            problems: vec![Problem {
                id: Uuid::new_v4(),
                category: vec!["water".to_string()],
                description: ProblemDescription {
                    english: "No water".to_string(),
                    hindi: "पानी नहीं".to_string(),
                },
            }],
        };
        let problem = ProblemRef {
            doc_id: doc.id,
            problem_id: doc.problems[0].id,
        };
        requests::append_documents(&pool, request.id, &[doc])
            .await
            .unwrap();

        (temp_dir, pool, request.id, problem)
    }

    fn reports_for(
        request_id: Uuid,
        problem_ids: Vec<ProblemRef>,
        summary: &str,
    ) -> (CommonProblemReport, WardReport, WardAnalysisReport) {
        let common = CommonProblemReport::new(
            request_id,
            vec![CommonProblemGroup {
                id: Uuid::new_v4(),
                problem_ids: problem_ids.clone(),
                issues: vec!["water".to_string()],
                summary: summary.to_string(),
            }],
        );
        let wards = WardReport::new(
            request_id,
            vec![WardGroup {
                ward_id: Uuid::new_v4(),
                ward: "3".to_string(),
                category: "water".to_string(),
                problems: vec![WardProblemGroup {
                    issues: vec!["water".to_string()],
                    summary: summary.to_string(),
                    problem_ids,
                }],
            }],
        );
        let analysis = WardAnalysisReport::new(
            request_id,
            vec![WardTally {
                ward: "3".to_string(),
                total_problems: 1,
                category: vec![],
            }],
        );
        (common, wards, analysis)
    }

    #[tokio::test]
    async fn test_save_and_overwrite() {
        let (_dir, pool, request_id, problem) = held_request_with_problem().await;

        let (c, w, a) = reports_for(request_id, vec![problem], "first");
        assert_eq!(save_reports(&pool, &c, &w, &a).await.unwrap(), SaveOutcome::Saved);

        let (c2, w2, a2) = reports_for(request_id, vec![problem], "second");
        assert_eq!(save_reports(&pool, &c2, &w2, &a2).await.unwrap(), SaveOutcome::Saved);

        let stored = get_reports(&pool, request_id).await.unwrap();
        let common = stored.common_problems.unwrap();
        assert_eq!(common.id, c2.id);
        assert_eq!(common.common_problems[0].summary, "second");
        assert_eq!(stored.wards.unwrap().wards[0].problems[0].summary, "second");
        assert_eq!(stored.ward_analysis.unwrap().wards[0].total_problems, 1);

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM common_problem_reports")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_rejects_non_partition_and_writes_nothing() {
        let (_dir, pool, request_id, problem) = held_request_with_problem().await;

        let (c, w, a) = reports_for(request_id, vec![problem, problem], "dup");
        let err = save_reports(&pool, &c, &w, &a).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));

        let (c, w, a) = reports_for(request_id, vec![], "missing");
        assert!(save_reports(&pool, &c, &w, &a).await.is_err());

        let stored = get_reports(&pool, request_id).await.unwrap();
        assert!(stored.common_problems.is_none());
        assert!(stored.wards.is_none());
        assert!(stored.ward_analysis.is_none());
    }

    #[tokio::test]
    async fn test_not_held_writes_nothing() {
        let (_dir, pool, request_id, problem) = held_request_with_problem().await;
        requests::mark_failed(&pool, request_id, "stop").await.unwrap();

        let (c, w, a) = reports_for(request_id, vec![problem], "late");
        assert_eq!(
            save_reports(&pool, &c, &w, &a).await.unwrap(),
            SaveOutcome::NotHeld
        );
        assert!(get_reports(&pool, request_id)
            .await
            .unwrap()
            .common_problems
            .is_none());
    }
}
