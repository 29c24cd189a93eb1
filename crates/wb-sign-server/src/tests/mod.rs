mod test_context;
mod auth_flow_test;
mod protected_test;
mod keystore_test;
