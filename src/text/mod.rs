// Text normalization: raw records into cleaned token sequences.

pub mod normalizer;
