// Topica: LDA topic modelling from raw text to labelled topics
//
// This is the library root. Each module corresponds to one stage of the
// pipeline: text cleaning, corpus building, fitting, persistence,
// evaluation, and analysis.

pub mod analysis;
pub mod config;
pub mod corpus;
pub mod dataset;
pub mod error;
pub mod evaluation;
pub mod fitter;
pub mod output;
pub mod pipeline;
pub mod rate_limit;
pub mod status;
pub mod storage;
pub mod text;
