mod activity_tests;
mod kernel_tests;
