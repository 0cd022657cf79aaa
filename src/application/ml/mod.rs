pub mod classifier_store;
pub mod feature_builder;
pub mod retrain_controller;
