use anyhow::Result;

fn main() -> Result<()> {
    let code = timebox::cli::run()?;
    std::process::exit(code)
}
