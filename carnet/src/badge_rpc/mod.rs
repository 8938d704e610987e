pub mod db_ops;
pub mod rpc;
