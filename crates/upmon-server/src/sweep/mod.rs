pub mod prober;
pub mod scheduler;
