pub mod controller;
pub mod difficulty;
pub mod entitlement;
pub mod generation;
pub mod handlers;
pub mod models;
pub mod narrative;
pub mod progress;
pub mod prompts;
pub mod quality;
pub mod question_gen;
pub mod records;
pub mod stages;
pub mod store;
pub mod summary;

#[cfg(test)]
pub mod test_support;
