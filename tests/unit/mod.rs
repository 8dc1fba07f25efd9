mod feed_tests;
mod property_tests;
mod service_tests;
mod surface_tests;
