pub mod buffer_pool;
pub mod catalog;
pub mod config;
pub mod context;
pub mod disk_manager;
pub mod errors;
pub mod execution;
pub mod index;
pub mod logical_plan;
pub mod pages;
pub mod rng;
pub mod sync;
pub mod table;
pub mod tuple;
pub mod txn;
pub mod types;

#[macro_export]
macro_rules! is_boolean_op {
    ($op: expr) => {
        matches!(
            $op,
            BinaryOperator::And
                | BinaryOperator::Or
                | BinaryOperator::Eq
                | BinaryOperator::NotEq
                | BinaryOperator::Gt
                | BinaryOperator::Lt
                | BinaryOperator::GtEq
                | BinaryOperator::LtEq
        )
    };
}
