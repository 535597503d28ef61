use crate::error::StoreError;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VerificationStats {
    pub total_requests: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
    pub recommended_approve: u64,
    pub recommended_review: u64,
    pub recommended_reject: u64,
    pub fraud_flagged: u64,
    pub decisions: u64,
    pub overrides: u64,
    pub override_rate: f64,            // overrides / decisions, 0 when no decisions
    pub mean_decision_latency_ms: Option<f64>,
}

pub fn collect(conn: &Connection) -> Result<VerificationStats, StoreError> {
    let mut stats = conn.query_row(
        "SELECT COUNT(*),
                COALESCE(SUM(status = 'PROCESSING'), 0),
                COALESCE(SUM(status = 'COMPLETED'), 0),
                COALESCE(SUM(status = 'FAILED'), 0),
                COALESCE(SUM(recommendation = 'APPROVE'), 0),
                COALESCE(SUM(recommendation = 'REVIEW'), 0),
                COALESCE(SUM(recommendation = 'REJECT'), 0),
                COALESCE(SUM(fraud_flag), 0)
         FROM verification_requests",
        [],
        |row| {
            Ok(VerificationStats {
                total_requests: row.get::<_, i64>(0)? as u64,
                processing: row.get::<_, i64>(1)? as u64,
                completed: row.get::<_, i64>(2)? as u64,
                failed: row.get::<_, i64>(3)? as u64,
                recommended_approve: row.get::<_, i64>(4)? as u64,
                recommended_review: row.get::<_, i64>(5)? as u64,
                recommended_reject: row.get::<_, i64>(6)? as u64,
                fraud_flagged: row.get::<_, i64>(7)? as u64,
                ..Default::default()
            })
        },
    )?;

    let (decisions, overrides, mean_latency) = conn.query_row(
        "SELECT COUNT(*), COALESCE(SUM(was_overridden), 0), AVG(latency_ms) FROM audit_logs",
        [],
        |row| {
            Ok((
                row.get::<_, i64>(0)? as u64,
                row.get::<_, i64>(1)? as u64,
                row.get::<_, Option<f64>>(2)?,
            ))
        },
    )?;

    stats.decisions = decisions;
    stats.overrides = overrides;
    stats.override_rate = if decisions > 0 {
        overrides as f64 / decisions as f64
    } else {
        0.0
    };
    stats.mean_decision_latency_ms = mean_latency;
    Ok(stats)
}

fn pct(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

/// Console report used by `--stats`.
pub fn print_report(stats: &VerificationStats) {
    println!("📊 Document Verification Statistics");
    println!("═══════════════════════════════════════");
    println!();
    println!("📈 Requests:");
    println!("  Total: {}", stats.total_requests);
    if stats.total_requests > 0 {
        println!(
            "  Completed: {} ({:.1}%)",
            stats.completed,
            pct(stats.completed, stats.total_requests)
        );
        println!(
            "  Failed: {} ({:.1}%)",
            stats.failed,
            pct(stats.failed, stats.total_requests)
        );
        println!("  Still processing: {}", stats.processing);
    }
    println!();
    println!("🧭 Recommendations:");
    println!("  Approve: {}", stats.recommended_approve);
    println!("  Review: {}", stats.recommended_review);
    println!("  Reject: {}", stats.recommended_reject);
    println!(
        "  Fraud flagged: {} ({:.1}% of completed)",
        stats.fraud_flagged,
        pct(stats.fraud_flagged, stats.completed)
    );
    println!();
    println!("🧑‍⚖️ Officer decisions:");
    println!("  Decisions: {}", stats.decisions);
    println!(
        "  Overrides: {} ({:.1}%)",
        stats.overrides,
        stats.override_rate * 100.0
    );
    match stats.mean_decision_latency_ms {
        Some(ms) => println!("  Mean time to decision: {:.1}s", ms / 1000.0),
        None => println!("  Mean time to decision: n/a"),
    }
}
