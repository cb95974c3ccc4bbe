//! Shared tests for UsageRepo implementations

use chrono::{Duration, NaiveDate, TimeZone, Utc};
use uuid::Uuid;

use crate::{
    db::repos::{DateRange, UsageRepo},
    models::{CallStatus, DailyUsageDelta, NewRequestLog},
};

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn delta(org_id: Uuid, model: &str, day: &str, input: i64, output: i64, cost: i64) -> DailyUsageDelta {
    DailyUsageDelta {
        org_id,
        model: model.to_string(),
        date: date(day),
        messages: 1,
        input_tokens: input,
        output_tokens: output,
        cost_cents: cost,
    }
}

fn log_entry(org_id: Uuid, status: CallStatus, tokens: (i64, i64)) -> NewRequestLog {
    NewRequestLog {
        org_id,
        user_id: None,
        model: "gpt-4o-mini".to_string(),
        prompt_length: 120,
        response_length: 480,
        input_tokens: tokens.0,
        output_tokens: tokens.1,
        duration_ms: 850,
        status,
        created_at: Utc::now(),
    }
}

fn october() -> DateRange {
    DateRange::month_of(date("2026-10-01"))
}

// ============================================================================
// Ledger
// ============================================================================

pub async fn test_upsert_creates_ledger_row(repo: &dyn UsageRepo) {
    let org_id = Uuid::new_v4();

    repo.upsert_daily_usage(delta(org_id, "gpt-4o-mini", "2026-10-19", 100, 200, 3))
        .await
        .expect("Failed to upsert daily usage");

    let rows = repo.get_daily_usage(org_id, october()).await.unwrap();
    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row.org_id, org_id);
    assert_eq!(row.model, "gpt-4o-mini");
    assert_eq!(row.date, date("2026-10-19"));
    assert_eq!(row.message_count, 1);
    assert_eq!(row.input_tokens, 100);
    assert_eq!(row.output_tokens, 200);
    assert_eq!(row.total_tokens, 300);
    assert_eq!(row.estimated_cost_cents, 3);
}

pub async fn test_upsert_is_additive(repo: &dyn UsageRepo) {
    let org_id = Uuid::new_v4();

    for _ in 0..3 {
        repo.upsert_daily_usage(delta(org_id, "claude-3-haiku", "2026-10-19", 10, 20, 1))
            .await
            .unwrap();
    }

    let rows = repo.get_daily_usage(org_id, october()).await.unwrap();
    assert_eq!(rows.len(), 1, "same (org, model, day) must share one row");
    assert_eq!(rows[0].message_count, 3);
    assert_eq!(rows[0].input_tokens, 30);
    assert_eq!(rows[0].output_tokens, 60);
    assert_eq!(rows[0].total_tokens, 90);
    assert_eq!(rows[0].estimated_cost_cents, 3);
}

pub async fn test_token_totals_saturate(repo: &dyn UsageRepo) {
    let org_id = Uuid::new_v4();

    let huge = delta(org_id, "gpt-4o-mini", "2026-10-19", i64::MAX, i64::MAX, 0);
    repo.upsert_daily_usage(huge)
        .await
        .expect("Failed to upsert daily usage");
    let rows = repo.get_daily_usage(org_id, october()).await.unwrap();
    assert_eq!(rows[0].total_tokens, i64::MAX);

    repo.log_request(log_entry(org_id, CallStatus::Success, (i64::MAX, 1)))
        .await
        .expect("Failed to log request");
    let logs = repo.list_request_logs(org_id, 10).await.unwrap();
    assert_eq!(logs[0].total_tokens, i64::MAX);
}

pub async fn test_ledger_rows_split_by_model_and_day(repo: &dyn UsageRepo) {
    let org_id = Uuid::new_v4();

    repo.upsert_daily_usage(delta(org_id, "gpt-4o-mini", "2026-10-18", 1, 1, 0))
        .await
        .unwrap();
    repo.upsert_daily_usage(delta(org_id, "gpt-4o-mini", "2026-10-19", 1, 1, 0))
        .await
        .unwrap();
    repo.upsert_daily_usage(delta(org_id, "gemini-2.0-flash", "2026-10-19", 1, 1, 0))
        .await
        .unwrap();

    let rows = repo.get_daily_usage(org_id, october()).await.unwrap();
    assert_eq!(rows.len(), 3);
    // Newest day first
    assert_eq!(rows[0].date, date("2026-10-19"));
    assert_eq!(rows[2].date, date("2026-10-18"));
}

pub async fn test_get_daily_usage_filters(repo: &dyn UsageRepo) {
    let org_id = Uuid::new_v4();
    let other_org = Uuid::new_v4();

    repo.upsert_daily_usage(delta(org_id, "gpt-4o-mini", "2026-09-30", 1, 1, 0))
        .await
        .unwrap();
    repo.upsert_daily_usage(delta(org_id, "gpt-4o-mini", "2026-10-01", 1, 1, 0))
        .await
        .unwrap();
    repo.upsert_daily_usage(delta(org_id, "gpt-4o-mini", "2026-10-31", 1, 1, 0))
        .await
        .unwrap();
    repo.upsert_daily_usage(delta(other_org, "gpt-4o-mini", "2026-10-15", 1, 1, 0))
        .await
        .unwrap();

    let rows = repo.get_daily_usage(org_id, october()).await.unwrap();
    let dates: Vec<_> = rows.iter().map(|r| r.date).collect();
    assert_eq!(dates, vec![date("2026-10-31"), date("2026-10-01")]);
}

pub async fn test_get_model_usage_groups_and_orders(repo: &dyn UsageRepo) {
    let org_id = Uuid::new_v4();

    repo.upsert_daily_usage(delta(org_id, "gpt-4o-mini", "2026-10-01", 100, 100, 1))
        .await
        .unwrap();
    repo.upsert_daily_usage(delta(org_id, "gpt-4o-mini", "2026-10-02", 100, 100, 1))
        .await
        .unwrap();
    repo.upsert_daily_usage(delta(org_id, "gemini-1.5-pro", "2026-10-02", 500, 500, 5))
        .await
        .unwrap();
    // Previous month is excluded
    repo.upsert_daily_usage(delta(org_id, "claude-3-haiku", "2026-09-30", 9, 9, 9))
        .await
        .unwrap();

    let models = repo.get_model_usage(org_id, october()).await.unwrap();
    assert_eq!(models.len(), 2);
    assert_eq!(models[0].model, "gemini-1.5-pro");
    assert_eq!(models[0].estimated_cost_cents, 5);
    assert_eq!(models[1].model, "gpt-4o-mini");
    assert_eq!(models[1].message_count, 2);
    assert_eq!(models[1].total_tokens, 400);
    assert_eq!(models[1].estimated_cost_cents, 2);
}

pub async fn test_get_model_usage_empty(repo: &dyn UsageRepo) {
    let models = repo.get_model_usage(Uuid::new_v4(), october()).await.unwrap();
    assert!(models.is_empty());
}

// ============================================================================
// Request log
// ============================================================================

pub async fn test_log_request_success(repo: &dyn UsageRepo) {
    let org_id = Uuid::new_v4();
    let user_id = Uuid::new_v4();

    repo.log_request(NewRequestLog {
        user_id: Some(user_id),
        ..log_entry(org_id, CallStatus::Success, (40, 60))
    })
    .await
    .expect("Failed to log request");

    let logs = repo.list_request_logs(org_id, 10).await.unwrap();
    assert_eq!(logs.len(), 1);
    let log = &logs[0];
    assert_eq!(log.org_id, org_id);
    assert_eq!(log.user_id, Some(user_id));
    assert_eq!(log.model, "gpt-4o-mini");
    assert_eq!(log.prompt_length, 120);
    assert_eq!(log.response_length, 480);
    assert_eq!(log.total_tokens, 100);
    assert_eq!(log.duration_ms, 850);
    assert_eq!(log.status, CallStatus::Success);
}

pub async fn test_log_request_error(repo: &dyn UsageRepo) {
    let org_id = Uuid::new_v4();

    repo.log_request(log_entry(
        org_id,
        CallStatus::Error("upstream returned 503".into()),
        (0, 0),
    ))
    .await
    .unwrap();

    let logs = repo.list_request_logs(org_id, 10).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].user_id, None);
    assert_eq!(logs[0].total_tokens, 0);
    assert_eq!(
        logs[0].status,
        CallStatus::Error("upstream returned 503".into())
    );
}

pub async fn test_list_request_logs_newest_first_with_limit(repo: &dyn UsageRepo) {
    let org_id = Uuid::new_v4();
    let base = Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap();

    for i in 0..5 {
        repo.log_request(NewRequestLog {
            duration_ms: i,
            created_at: base + Duration::seconds(i),
            ..log_entry(org_id, CallStatus::Success, (1, 1))
        })
        .await
        .unwrap();
    }

    let logs = repo.list_request_logs(org_id, 3).await.unwrap();
    let durations: Vec<_> = logs.iter().map(|l| l.duration_ms).collect();
    assert_eq!(durations, vec![4, 3, 2]);
}

// ============================================================================
// Retention
// ============================================================================

pub async fn test_delete_daily_usage_before(repo: &dyn UsageRepo) {
    let org_id = Uuid::new_v4();

    for day in ["2026-07-01", "2026-07-02", "2026-10-01"] {
        repo.upsert_daily_usage(delta(org_id, "gpt-4o-mini", day, 1, 1, 0))
            .await
            .unwrap();
    }

    let deleted = repo
        .delete_daily_usage_before(date("2026-10-01"), 1000, u64::MAX)
        .await
        .unwrap();
    assert_eq!(deleted, 2);

    let all = DateRange {
        start: date("2026-01-01"),
        end: date("2026-12-31"),
    };
    let rows = repo.get_daily_usage(org_id, all).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].date, date("2026-10-01"));
}

pub async fn test_delete_daily_usage_respects_max_deletes(repo: &dyn UsageRepo) {
    let org_id = Uuid::new_v4();

    for day in 1..=5 {
        repo.upsert_daily_usage(delta(
            org_id,
            "gpt-4o-mini",
            &format!("2026-07-0{}", day),
            1,
            1,
            0,
        ))
        .await
        .unwrap();
    }

    // Batches of 2, stop after 3
    let deleted = repo
        .delete_daily_usage_before(date("2026-10-01"), 2, 3)
        .await
        .unwrap();
    assert_eq!(deleted, 3);

    let rest = repo
        .delete_daily_usage_before(date("2026-10-01"), 2, u64::MAX)
        .await
        .unwrap();
    assert_eq!(rest, 2);
}

pub async fn test_delete_request_logs_before(repo: &dyn UsageRepo) {
    let org_id = Uuid::new_v4();
    let now = Utc::now();

    for age_days in [120, 91, 10, 0] {
        repo.log_request(NewRequestLog {
            created_at: now - Duration::days(age_days),
            ..log_entry(org_id, CallStatus::Success, (1, 1))
        })
        .await
        .unwrap();
    }

    let deleted = repo
        .delete_request_logs_before(now - Duration::days(90), 1, u64::MAX)
        .await
        .unwrap();
    assert_eq!(deleted, 2);

    let logs = repo.list_request_logs(org_id, 10).await.unwrap();
    assert_eq!(logs.len(), 2);
    assert!(logs.iter().all(|l| l.created_at > now - Duration::days(90)));
}

#[cfg(feature = "database-sqlite")]
mod sqlite_tests {
    use crate::db::{
        sqlite::SqliteUsageRepo,
        tests::harness::{create_sqlite_pool, run_sqlite_migrations},
    };

    async fn create_repo() -> SqliteUsageRepo {
        let pool = create_sqlite_pool().await;
        run_sqlite_migrations(&pool).await;
        SqliteUsageRepo::new(pool)
    }

    macro_rules! sqlite_test {
        ($name:ident) => {
            #[tokio::test]
            async fn $name() {
                let repo = create_repo().await;
                super::$name(&repo).await;
            }
        };
    }

    // Ledger tests
    sqlite_test!(test_upsert_creates_ledger_row);
    sqlite_test!(test_upsert_is_additive);
    sqlite_test!(test_token_totals_saturate);
    sqlite_test!(test_ledger_rows_split_by_model_and_day);
    sqlite_test!(test_get_daily_usage_filters);
    sqlite_test!(test_get_model_usage_groups_and_orders);
    sqlite_test!(test_get_model_usage_empty);

    // Request log tests
    sqlite_test!(test_log_request_success);
    sqlite_test!(test_log_request_error);
    sqlite_test!(test_list_request_logs_newest_first_with_limit);

    // Retention tests
    sqlite_test!(test_delete_daily_usage_before);
    sqlite_test!(test_delete_daily_usage_respects_max_deletes);
    sqlite_test!(test_delete_request_logs_before);
}

#[cfg(feature = "database-postgres")]
mod postgres_tests {
    use crate::db::{
        postgres::PostgresUsageRepo,
        tests::harness::postgres::{create_isolated_postgres_pool, run_postgres_migrations},
    };

    macro_rules! postgres_test {
        ($name:ident) => {
            #[tokio::test]
            #[ignore = "Requires Docker - run with `cargo test -- --ignored`"]
            async fn $name() {
                let pool = create_isolated_postgres_pool().await;
                run_postgres_migrations(&pool).await;
                let repo = PostgresUsageRepo::new(pool, None);
                super::$name(&repo).await;
            }
        };
    }

    // Ledger tests
    postgres_test!(test_upsert_creates_ledger_row);
    postgres_test!(test_upsert_is_additive);
    postgres_test!(test_token_totals_saturate);
    postgres_test!(test_ledger_rows_split_by_model_and_day);
    postgres_test!(test_get_daily_usage_filters);
    postgres_test!(test_get_model_usage_groups_and_orders);
    postgres_test!(test_get_model_usage_empty);

    // Request log tests
    postgres_test!(test_log_request_success);
    postgres_test!(test_log_request_error);
    postgres_test!(test_list_request_logs_newest_first_with_limit);

    // Retention tests
    postgres_test!(test_delete_daily_usage_before);
    postgres_test!(test_delete_daily_usage_respects_max_deletes);
    postgres_test!(test_delete_request_logs_before);
}
