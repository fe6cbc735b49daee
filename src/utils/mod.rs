pub mod arff;
pub mod evaluation;
pub mod logging;
