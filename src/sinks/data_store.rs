use async_trait::async_trait;

/// External collaborator for CSV-backed request fixtures (§6). The core
/// never implements this itself — "CSV data-file fixtures" are explicitly
/// out of scope (§1) — but an `Attacker` that replays fixture rows depends
/// on something shaped like this.
#[async_trait]
pub trait DataStore: Send + Sync {
    async fn read(&self, name: &str) -> Result<Vec<String>, String>;
    async fn write(&self, name: &str, row: &[String]) -> Result<(), String>;
    async fn flush(&self, name: &str) -> Result<(), String>;
    async fn recycle(&self, name: &str) -> Result<(), String>;
}
