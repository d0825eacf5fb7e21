// Topic model fitting: the fitter capability and its bundled Gibbs backend.

pub mod gibbs;
pub mod model;
pub mod traits;
