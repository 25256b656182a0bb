#[tokio::main]
async fn main() -> anyhow::Result<()> {
    lims_db_rust::run_server().await
}
