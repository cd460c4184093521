use trashcan_cleaner::trashcan_cleaner_service_entrypoint;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    trashcan_cleaner_service_entrypoint().await
}
