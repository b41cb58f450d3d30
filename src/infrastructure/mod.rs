pub mod gateway;
pub mod models;
pub mod order_repo;
pub mod payment_repo;
pub mod signature;

#[cfg(test)]
pub mod test_support;
