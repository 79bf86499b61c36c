pub mod negotiation_tests;
