//! 终端层：按行读取输入、流式输出回复（I/O 外壳，不含业务逻辑）

pub mod repl;

pub use repl::run_repl;
