pub mod chunks;
pub mod ddl;
pub mod hubs;
pub mod meetings;
pub mod projects;
