pub mod usage_counter_postgres;

pub use usage_counter_postgres::UsageCounterPostgresRepository;
