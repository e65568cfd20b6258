//! Handoff brief rendering
//!
//! A Markdown summary of a lead handed to the winning builder (or to the
//! business once the sprint is over).

use std::fmt::{self, Write};

use crate::view::{LeadView, SprintPhase};

const MAX_QUOTES_PER_CLUSTER: usize = 3;

fn phase_label(phase: SprintPhase) -> &'static str {
    match phase {
        SprintPhase::NotLaunched => "Not launched",
        SprintPhase::Open => "Sprint open",
        SprintPhase::Full => "Sprint full",
        SprintPhase::Evaluating => "Evaluating finalists",
        SprintPhase::Awarded => "Awarded",
        SprintPhase::Terminated => "Terminated",
    }
}

/// Render the handoff brief for a lead
pub fn render_markdown(view: &LeadView) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail
    let _ = write_brief(&mut out, view);
    out
}

/// Write the handoff brief into any formatter sink
pub fn write_brief<W: Write>(out: &mut W, view: &LeadView) -> fmt::Result {
    let lead = &view.lead;

    writeln!(out, "# {}", lead.business_name)?;
    writeln!(out)?;

    let location: Vec<&str> = [
        lead.location.neighborhood.as_deref(),
        lead.location.borough.as_deref(),
        lead.location.zip.as_deref(),
    ]
    .into_iter()
    .flatten()
    .collect();
    if !location.is_empty() {
        writeln!(out, "**Location:** {}", location.join(", "))?;
    }
    if let Some(friction) = &lead.friction_type {
        writeln!(out, "**Friction:** {}", friction)?;
    }
    writeln!(out, "**Status:** {}", phase_label(view.sprint_phase))?;
    writeln!(out)?;

    writeln!(out, "## Friction intensity")?;
    writeln!(out)?;
    writeln!(out, "- Weighted issues: {:.1}", view.weighted_issues)?;
    writeln!(out, "- Recency score: {:.0}%", view.recency_score * 100.0)?;
    writeln!(out)?;

    if !lead.complaint_clusters.is_empty() {
        writeln!(out, "## Complaint clusters")?;
        writeln!(out)?;
        for cluster in &lead.complaint_clusters {
            writeln!(
                out,
                "### {} ({} total, {} recent)",
                cluster.category, cluster.total_count, cluster.recent_count
            )?;
            for quote in cluster.sample_quotes.iter().take(MAX_QUOTES_PER_CLUSTER) {
                writeln!(out, "> {}", quote)?;
                writeln!(out)?;
            }
        }
    }

    writeln!(out, "## Sprint outcome")?;
    writeln!(out)?;
    match &lead.winner_user_id {
        Some(winner) => {
            let name = view
                .builder_details
                .iter()
                .find(|d| &d.user_id == winner)
                .and_then(|d| d.name.as_deref())
                .unwrap_or(winner);
            writeln!(out, "Winner: **{}**", name)?;
            if let Some(average) = lead.winner_average_score {
                writeln!(out, "Peer vote average: {:.2}", average)?;
            }
            if let Some(link) = lead.builder(winner).and_then(|b| b.latest_proof_link()) {
                writeln!(out, "Deliverable: {}", link)?;
            }
        }
        None => {
            writeln!(out, "No winner yet.")?;
        }
    }

    if !view.builder_details.is_empty() {
        writeln!(out)?;
        writeln!(out, "| Builder | Specialty | Checkpoints |")?;
        writeln!(out, "|---|---|---|")?;
        for detail in &view.builder_details {
            writeln!(
                out,
                "| {} | {} | {} |",
                detail.name.as_deref().unwrap_or(&detail.user_id),
                detail.specialty.as_deref().unwrap_or("-"),
                detail.checkpoints_completed
            )?;
        }
    }

    Ok(())
}
