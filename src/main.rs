fn main() -> anyhow::Result<()> {
    edgerun::cli::run_cli()
}
