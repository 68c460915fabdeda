use {
    gex_util::env::ProcessEnv,
    std::{io, sync::Arc},
    tracing_subscriber::EnvFilter,
};

fn main()
{
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("GEX_LOG")
                .unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    if let Err(err) = run() {
        match err.downcast_ref::<gex_core::Error>() {
            Some(err) => gex_core::fatal(err),
            None => {
                eprintln!("gex-probe: {:#}", err);
                std::process::exit(1);
            },
        }
    }
}

fn run() -> anyhow::Result<()>
{
    let env = Arc::new(ProcessEnv::default());
    let mode = gex::Mode::from_env(&*env)?;
    let probes = gex::run(env, mode, &mut io::stderr())?;
    println!("{}", serde_json::to_string_pretty(&probes)?);
    Ok(())
}
