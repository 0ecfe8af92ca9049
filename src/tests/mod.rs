
mod indexer_tests;
