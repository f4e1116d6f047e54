use std::ops::{Add, BitAnd, BitOr, Div, Mul, Neg, Not, Sub};

use super::Column;
use crate::engine::{BinaryOp, UnaryOp};

macro_rules! column_binop {
    ($trait:ident, $method:ident, $op:expr) => {
        impl<T: Into<Column>> $trait<T> for Column {
            type Output = Column;

            fn $method(self, rhs: T) -> Column {
                self.binary($op, rhs)
            }
        }

        impl<T: Into<Column>> $trait<T> for &Column {
            type Output = Column;

            fn $method(self, rhs: T) -> Column {
                self.binary($op, rhs)
            }
        }
    };
}

column_binop!(Add, add, BinaryOp::Add);
column_binop!(Sub, sub, BinaryOp::Sub);
column_binop!(Mul, mul, BinaryOp::Mul);
column_binop!(Div, div, BinaryOp::Div);
column_binop!(BitAnd, bitand, BinaryOp::And);
column_binop!(BitOr, bitor, BinaryOp::Or);

impl Neg for Column {
    type Output = Column;

    fn neg(self) -> Column {
        self.unary(UnaryOp::Neg)
    }
}

impl Neg for &Column {
    type Output = Column;

    fn neg(self) -> Column {
        self.unary(UnaryOp::Neg)
    }
}

impl Not for Column {
    type Output = Column;

    fn not(self) -> Column {
        self.unary(UnaryOp::Not)
    }
}

impl Not for &Column {
    type Output = Column;

    fn not(self) -> Column {
        self.unary(UnaryOp::Not)
    }
}
