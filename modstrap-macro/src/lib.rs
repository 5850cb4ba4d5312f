use proc_macro::TokenStream;

mod module;

/// Attribute macro declaring a module's id and module dependencies
///
/// Generates an `impl modstrap::ModuleMetadata` for the annotated struct.
/// Pair it with an `impl modstrap::Module` and load the module with
/// `ModuleDescriptor::of`.
///
/// # Example
/// ```ignore
/// use modstrap::module;
///
/// #[module(id = "users", dependencies = ["db", "config"])]
/// pub struct UsersModule;
/// ```
#[proc_macro_attribute]
pub fn module(attr: TokenStream, item: TokenStream) -> TokenStream {
    module::module_attribute(attr, item)
}
