use anyhow::Result;

fn main() -> Result<()> {
    forkbox::cli::run()
}
