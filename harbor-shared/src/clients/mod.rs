pub mod db;
pub mod redis;
pub mod rabbitmq;
pub mod minio;
pub mod users;
