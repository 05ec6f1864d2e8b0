pub use super::download_records::Entity as DownloadRecords;
