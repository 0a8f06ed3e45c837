//! Test attribute macros for cc110x-rs.
//!
//! - `#[device_test]` marks a host unit test that runs with `env_logger`
//!   initialised, so `RUST_LOG=trace cargo test` shows SPI traffic.
//! - `#[tap_test]` registers a test with the on-target TAP harness
//!   (`cc110x_rs::testing`), run by the `device-tests` binary.

use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, Expr, ExprLit, ItemFn, Lit, Meta, ReturnType};

/// Mark a function as a host unit test with logging enabled.
///
/// Expands to a `#[test]` function whose body is preceded by a
/// `try_init` of the test logger. Other attributes (`#[should_panic]`,
/// `#[ignore]`) are passed through unchanged.
///
/// ```ignore
/// use cc110x_rs_macros::device_test;
///
/// #[device_test]
/// fn fifo_starts_empty() {
///     assert!(HwFifo::new().is_empty());
/// }
/// ```
#[proc_macro_attribute]
pub fn device_test(attr: TokenStream, item: TokenStream) -> TokenStream {
    if !attr.is_empty() {
        return syn::Error::new(
            proc_macro2::Span::call_site(),
            "device_test takes no arguments; use #[should_panic] alongside it",
        )
        .to_compile_error()
        .into();
    }

    let input_fn = parse_macro_input!(item as ItemFn);
    let attrs = &input_fn.attrs;
    let vis = &input_fn.vis;
    let sig = &input_fn.sig;
    let block = &input_fn.block;

    let expanded = quote! {
        #[test]
        #(#attrs)*
        #vis #sig {
            let _ = ::env_logger::builder().is_test(true).try_init();
            #block
        }
    };

    TokenStream::from(expanded)
}

/// Mark a function as a TAP test.
///
/// The function is registered with the `inventory` collector and executed
/// by `cc110x_rs::testing::run_all_tests`. A test either returns nothing
/// (a panic is a failure) or returns `Result<(), E>` (an `Err` is a failure).
///
/// - `#[tap_test]`
/// - `#[tap_test(should_panic)]`
/// - `#[tap_test(should_panic = "expected message")]`
///
/// ```ignore
/// use cc110x_rs_macros::tap_test;
///
/// #[tap_test(should_panic = "protocol fault")]
/// fn fifo_read_from_strobe_address_faults() {
///     chip_with_fatal_faults().transfer(0x3F);
/// }
/// ```
#[proc_macro_attribute]
pub fn tap_test(attr: TokenStream, item: TokenStream) -> TokenStream {
    let input_fn = parse_macro_input!(item as ItemFn);

    let fn_name = &input_fn.sig.ident;
    let fn_name_str = fn_name.to_string();
    let fn_block = &input_fn.block;
    let fn_vis = &input_fn.vis;
    let fn_attrs = &input_fn.attrs;
    let fn_output = &input_fn.sig.output;
    let returns_result = matches!(fn_output, ReturnType::Type(_, _));

    let should_panic = match parse_should_panic(attr) {
        Ok(sp) => sp,
        Err(e) => return e.to_compile_error().into(),
    };

    let expect = match should_panic {
        ShouldPanic::No => quote! { ::cc110x_rs::testing::Expect::Success },
        ShouldPanic::Yes => quote! { ::cc110x_rs::testing::Expect::Panic },
        ShouldPanic::WithMessage(msg) => quote! { ::cc110x_rs::testing::Expect::PanicWith(#msg) },
    };
    let body = if returns_result {
        quote! { || #fn_name().map_err(::core::convert::Into::into) }
    } else {
        quote! { || { #fn_name(); ::core::result::Result::Ok(()) } }
    };

    let expanded = quote! {
        #(#fn_attrs)*
        #fn_vis fn #fn_name() #fn_output #fn_block

        ::inventory::submit! {
            ::cc110x_rs::testing::TapTestEntry {
                name: #fn_name_str,
                expect: #expect,
                body: #body,
            }
        }
    };

    TokenStream::from(expanded)
}

enum ShouldPanic {
    No,
    Yes,
    WithMessage(String),
}

fn parse_should_panic(attr: TokenStream) -> syn::Result<ShouldPanic> {
    if attr.is_empty() {
        return Ok(ShouldPanic::No);
    }

    let meta: Meta = syn::parse(attr)?;
    match meta {
        Meta::Path(p) if p.is_ident("should_panic") => Ok(ShouldPanic::Yes),
        Meta::NameValue(nv) if nv.path.is_ident("should_panic") => match nv.value {
            Expr::Lit(ExprLit {
                lit: Lit::Str(s), ..
            }) => Ok(ShouldPanic::WithMessage(s.value())),
            other => Err(syn::Error::new_spanned(
                other,
                "tap_test: should_panic expects a string literal",
            )),
        },
        other => Err(syn::Error::new_spanned(
            other,
            "tap_test: supported attributes are should_panic and should_panic = \"message\"",
        )),
    }
}
