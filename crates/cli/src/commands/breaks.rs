//! Break session commands against the agent API

use anyhow::Result;
use colored::Colorize;

use crate::client::{ApiClient, LastBreakResponse, SessionSnapshot, StartBreakRequest};
use crate::output::{
    color_state, format_confidence, format_epoch_ms, print_info, print_json, print_success,
    print_warning, OutputFormat,
};
use eyebreak_core::BreakOutcome;

const BREAKS_PATH: &str = "api/v1/breaks";
const CURRENT_PATH: &str = "api/v1/breaks/current";
const LAST_PATH: &str = "api/v1/breaks/last";

/// Start a break session
pub async fn start(client: &ApiClient, duration: Option<u64>, format: OutputFormat) -> Result<()> {
    let request = StartBreakRequest {
        break_duration_secs: duration,
    };
    let snapshot: SessionSnapshot = client.post(BREAKS_PATH, &request).await?;

    match format {
        OutputFormat::Json => print_json(&snapshot)?,
        OutputFormat::Table => {
            print_success(&format!("Break session {} started", snapshot.id.cyan()));
            println!(
                "Close your eyes for {} seconds; the camera will confirm it.",
                snapshot.break_duration_secs
            );
        }
    }

    Ok(())
}

/// Show the running session
pub async fn status(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let snapshot: Option<SessionSnapshot> = client.get_optional(CURRENT_PATH).await?;

    match (snapshot, format) {
        (None, OutputFormat::Json) => println!("null"),
        (None, OutputFormat::Table) => print_info("No break session is running"),
        (Some(snapshot), OutputFormat::Json) => print_json(&snapshot)?,
        (Some(snapshot), OutputFormat::Table) => print_snapshot(&snapshot),
    }

    Ok(())
}

/// Cancel the running session
pub async fn cancel(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let snapshot: Option<SessionSnapshot> = client.delete(CURRENT_PATH).await?;

    match (snapshot, format) {
        (None, OutputFormat::Json) => println!("null"),
        (None, OutputFormat::Table) => print_warning("No break session to cancel"),
        (Some(snapshot), OutputFormat::Json) => print_json(&snapshot)?,
        (Some(snapshot), OutputFormat::Table) => {
            print_success(&format!("Break session {} cancelled", snapshot.id.cyan()))
        }
    }

    Ok(())
}

/// Show the last completed break and the most recent session outcome
pub async fn last(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let response: LastBreakResponse = client.get(LAST_PATH).await?;

    if let OutputFormat::Json = format {
        return print_json(&response);
    }

    println!("{}", "Last Break".bold());
    println!("{}", "=".repeat(50));
    match response.last_completed_at {
        Some(ms) => println!("Last completed:  {}", format_epoch_ms(ms).green()),
        None => println!("Last completed:  {}", "never".yellow()),
    }

    if let Some(session) = response.last_session {
        println!();
        println!("Session:         {}", session.session_id.cyan());
        println!("Finished at:     {}", session.finished_at);
        match (session.outcome, session.error) {
            (Some(outcome), _) => println!("Outcome:         {}", describe_outcome(&outcome)),
            (None, Some(error)) => println!("Outcome:         {}", error.red()),
            (None, None) => println!("Outcome:         unknown"),
        }
    }

    Ok(())
}

fn print_snapshot(snapshot: &SessionSnapshot) {
    println!("{}", "Break Session".bold());
    println!("{}", "=".repeat(50));
    println!("ID:                  {}", snapshot.id.cyan());
    println!("State:               {}", color_state(&snapshot.state.to_string()));
    println!(
        "Started:             {}",
        snapshot.started_at.format("%Y-%m-%d %H:%M:%S")
    );
    println!("Duration:            {}s", snapshot.break_duration_secs);
    println!();
    println!("{}", "Pipeline".bold());
    println!("{}", "-".repeat(50));
    println!("Frames received:     {}", snapshot.frames.frames_received);
    println!("Frames throttled:    {}", snapshot.frames.frames_throttled);
    println!("Inferences:          {}", snapshot.frames.inferences);
    println!("Inference failures:  {}", snapshot.frames.inference_failures);
    println!("Consecutive fails:   {}", snapshot.consecutive_failures);

    if let Some(result) = &snapshot.last_result {
        println!(
            "Last result:         {} ({})",
            result.label,
            format_confidence(result.confidence)
        );
    }
}

fn describe_outcome(outcome: &BreakOutcome) -> String {
    match outcome {
        BreakOutcome::Completed { label, confidence } => format!(
            "{} ({} at {})",
            "completed".green(),
            label,
            format_confidence(*confidence)
        ),
        BreakOutcome::Cancelled => "cancelled".yellow().to_string(),
    }
}
