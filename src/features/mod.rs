pub mod bulk_download;
