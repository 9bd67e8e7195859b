pub mod clock;
pub mod directory;
pub mod progress;
pub mod stop;
