// Domain layer: models, the rejection report and the ports the pipeline talks through.

pub mod model;
pub mod ports;
pub mod report;
