
mod pipeline_tests;
mod reconcile_tests;
