pub mod checkpoint;
pub mod clock;
pub mod task;
pub mod workflow;
