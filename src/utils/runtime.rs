use anyhow::Result;

/// The daemon runs two cooperating loops, so a current-thread runtime is
/// enough and keeps the process light.
pub fn single_thread_runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?)
}
