use crate::{is_unit, output_type, result_ok_type};
use syn::{ReturnType, Type};

/// 处理器方法返回类型的分类
pub(crate) enum ReturnKind {
    /// 无返回类型或 `()`
    Void,
    /// `Result<(), E>`
    FallibleVoid,
    /// `Result<T, E>`，携带 `T`
    Fallible(Type),
    /// 其他类型
    Value(Type),
}

impl ReturnKind {
    pub(crate) fn of(output: &ReturnType) -> Self {
        let Some(ty) = output_type(output) else {
            return Self::Void;
        };
        if is_unit(ty) {
            return Self::Void;
        }

        match result_ok_type(ty) {
            Some(ok) if is_unit(ok) => Self::FallibleVoid,
            Some(ok) => Self::Fallible(ok.clone()),
            None => Self::Value(ty.clone()),
        }
    }
}
