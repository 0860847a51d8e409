pub mod health;
pub mod prompt;
pub mod reset;
pub mod scenario;
pub mod simulate;
