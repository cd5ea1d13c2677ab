//! Entry point naming for built modules
//!
//! A live module exports two things the reload layer looks up by name: the
//! vtable of the watched type and a placement constructor. The vtable name
//! depends on the toolchain's mangling, so it is derived from the settings.

use serde::{Deserialize, Serialize};

/// Exported name of the placement constructor every live module provides.
///
/// Signature: `extern "C" fn(*mut c_void) -> *mut c_void`, constructing a
/// fresh instance at the given address and returning it.
pub const PLACEMENT_CONSTRUCTOR_SYMBOL: &str = "rt_placement_new_operator";

/// How the vtable symbol of a type is spelled in a built module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolScheme {
    /// MSVC decorated names (`??_7Type@ns@@6B@`)
    Msvc,
    /// Itanium C++ ABI (`_ZTVN2ns4TypeE`), used by GCC and Clang
    Itanium,
    /// Plain C export named `rt_vtable_<ModuleName>`
    Export,
}

impl SymbolScheme {
    /// Scheme matching the toolchain the host was most likely built with
    pub fn native() -> Self {
        if cfg!(target_env = "msvc") {
            SymbolScheme::Msvc
        } else {
            SymbolScheme::Itanium
        }
    }

    /// Symbol name of the vtable for `type_name` (`::`-separated scopes)
    pub fn vtable_symbol(&self, type_name: &str, module_name: &str) -> String {
        let scopes: Vec<&str> = type_name
            .split("::")
            .filter(|s| !s.is_empty())
            .collect();

        match self {
            SymbolScheme::Msvc => {
                let mut name = String::from("??_7");
                for scope in scopes.iter().rev() {
                    name.push_str(scope);
                    name.push('@');
                }
                name.push_str("@6B@");
                name
            }
            SymbolScheme::Itanium => {
                let mut name = String::from("_ZTV");
                if scopes.len() > 1 {
                    name.push('N');
                }
                for scope in &scopes {
                    name.push_str(&scope.len().to_string());
                    name.push_str(scope);
                }
                if scopes.len() > 1 {
                    name.push('E');
                }
                name
            }
            SymbolScheme::Export => format!("rt_vtable_{}", module_name),
        }
    }

    /// Byte offset from the vtable symbol to the address stored in objects.
    ///
    /// Itanium vtables start with offset-to-top and the RTTI pointer; the
    /// object's vptr points past them.
    pub fn address_point_offset(&self) -> usize {
        match self {
            SymbolScheme::Itanium => 2 * std::mem::size_of::<usize>(),
            SymbolScheme::Msvc | SymbolScheme::Export => 0,
        }
    }
}

impl Default for SymbolScheme {
    fn default() -> Self {
        Self::native()
    }
}
