//! Database initialization handler

use crate::cli::output::print_info;
use crate::cli::output::print_success;
use crate::cli::output::print_warning;
use crate::KnowRag;
use crate::Result;

/// Handle database initialization command
pub async fn handle_init_command(knowrag: &KnowRag, force: bool) -> Result<()> {
    if !force {
        print_warning("This will initialize the database schema and create indexes.");
        print_warning("This operation is safe - it uses CREATE IF NOT EXISTS.");
        println!("\nUse --force to proceed.");
        return Ok(());
    }

    print_info("🗄️  Initializing knowrag database...");
    let dimension = knowrag.config().embedding_dimension();
    match knowrag.init_schema().await {
        Ok(()) => {
            print_success("Tracking and dead-letter tables created");
            print_success(&format!("Vector table configured for {dimension} dimensions"));
        }
        Err(e) => {
            if e.to_string().contains("vector") || e.to_string().contains("extension") {
                print_warning(&format!("Could not enable pgvector extension: {e}"));
                print_warning("Please run on the database server:");
                println!("  psql -c 'CREATE EXTENSION IF NOT EXISTS vector;'");
                println!();
                println!("Then run: knowrag init --force");
            }
            return Err(e);
        }
    }

    println!();
    print_success("🎉 Database initialization complete!");
    print_info("To ingest a batch, run:");
    println!("   knowrag ingest --batch-id <id> --project <project> s3://<bucket>/<key>");
    Ok(())
}
