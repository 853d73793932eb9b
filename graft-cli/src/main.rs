use anyhow::Result;
use clap::Parser;
use graft_cli::{Args, init_tracing, run};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let report = run(args).await?;

    if let Some(report) = report {
        let summary = &report.summary;
        info!(
            run_id = %report.run_id,
            entities_created = summary.entities_created,
            entities_updated = summary.entities_updated,
            relations_created = summary.relations_created,
            relations_updated = summary.relations_updated,
            "run complete"
        );
        if report.has_failures() {
            warn!(
                entities_failed = summary.entities_failed,
                relations_failed = summary.relations_failed,
                "run completed with failures, see the result logs"
            );
        }
    }

    Ok(())
}
