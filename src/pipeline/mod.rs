// Training pipeline: run specification parsing and the batch trainer.

pub mod batch;
pub mod spec;
