pub mod blur_worker;
pub mod model_cache;
