pub mod admission;
pub mod availability;
pub mod booking_store;
pub mod pricing;

#[cfg(test)]
pub mod memory_store;
