pub mod threaded_stream_executor;
