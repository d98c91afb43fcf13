mod composition_test;
mod context_test;
mod lifecycle_test;
