use tinychain::cli::run_cli;

fn main() -> anyhow::Result<()> {
    // Logging is initialized inside run_cli once the --debug flag is known
    if let Err(e) = run_cli() {
        if e.is_fatal() {
            log::error!("💥 Ledger storage is unusable: {}", e);
        }
        return Err(e.into());
    }

    Ok(())
}
