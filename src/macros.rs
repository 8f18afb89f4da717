// Copyright (c) 2026 Exveria
// SPDX-License-Identifier: MIT OR Apache-2.0

#[macro_export]
/// Returns early with `Err(status)` when `cond` is false.
macro_rules! ensure {
    ($cond:expr, $status:expr $(,)?) => {
        if !$cond {
            return Err($status);
        }
    };
    ($cond:expr, $status:expr, $($arg:tt)+) => {
        if !$cond {
            $crate::trace::report_error_msg(
                file!(),
                line!(),
                $crate::Status::from($status).into_raw(),
                format_args!($($arg)+),
            );
            return Err($status);
        }
    };
}

#[macro_export]
/// Logs the failed condition through the trace sink and traps.
macro_rules! com_assert {
    ($cond:expr $(,)?) => {
        if !$cond {
            $crate::trap::assert_failed(file!(), line!(), stringify!($cond), None);
        }
    };
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            $crate::trap::assert_failed(
                file!(),
                line!(),
                stringify!($cond),
                Some(format_args!($($arg)+)),
            );
        }
    };
}

#[macro_export]
/// Declares a COM interface.
///
/// Generates the implementation trait, the `#[repr(C)]` vtable `IFooVtbl`
/// (parent vtable first), the raw interface pointee `IFooRaw` usable with
/// `ComRc`, and the `IID_IFOO` constant.
///
/// ```ignore
/// declare_com_interface! {
///     pub trait IFoo: IUnknown {
///         const IID: GUID = GUID::new(0x1122_3344, 0x5566, 0x7788, [0; 8]);
///         fn ping(&self, value: u32) -> u32;
///     }
/// }
/// ```
///
/// The parent may be `IUnknown` or another declared interface. Calls through
/// `IFooRaw` are `unsafe`: the raw pointee cannot vouch for its own vtable.
macro_rules! declare_com_interface {
    (
        $(#[$attr:meta])*
        $vis:vis trait $name:ident: IUnknown {
            const IID: $guid_ty:ty = $guid:expr;
            $(
                $(#[$method_attr:meta])*
                fn $method:ident(&self $(, $arg:ident: $arg_ty:ty)* $(,)?) -> $ret:ty;
            )*
        }
    ) => {
        $crate::__mcom_define_interface! {
            attrs [$(#[$attr])*],
            vis ($vis),
            name $name,
            supertrait (::core::marker::Sync),
            parent_vtable ($crate::IUnknownVtbl),
            parent_raw (),
            iid ($guid),
            methods [$(
                [$(#[$method_attr])*] $method ($($arg: $arg_ty),*) -> $ret;
            )*]
        }
    };
    (
        $(#[$attr:meta])*
        $vis:vis trait $name:ident: $parent:ident {
            const IID: $guid_ty:ty = $guid:expr;
            $(
                $(#[$method_attr:meta])*
                fn $method:ident(&self $(, $arg:ident: $arg_ty:ty)* $(,)?) -> $ret:ty;
            )*
        }
    ) => {
        $crate::paste::paste! {
            $crate::__mcom_define_interface! {
                attrs [$(#[$attr])*],
                vis ($vis),
                name $name,
                supertrait ($parent),
                parent_vtable ([<$parent Vtbl>]),
                parent_raw ([<$parent Raw>]),
                iid ($guid),
                methods [$(
                    [$(#[$method_attr])*] $method ($($arg: $arg_ty),*) -> $ret;
                )*]
            }
        }
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __mcom_define_interface {
    (
        attrs [$($attrs:tt)*],
        vis ($vis:vis),
        name $name:ident,
        supertrait ($($supertrait:tt)+),
        parent_vtable ($($parent_vtable:tt)+),
        parent_raw ($($parent_raw:tt)*),
        iid ($guid:expr),
        methods [$(
            [$($method_attrs:tt)*] $method:ident ($($arg:ident: $arg_ty:ty),*) -> $ret:ty;
        )*]
    ) => {
        $($attrs)*
        $vis trait $name: $($supertrait)+ {
            $(
                $($method_attrs)*
                fn $method(&self $(, $arg: $arg_ty)*) -> $ret;
            )*
        }

        $crate::paste::paste! {
            $vis const [<IID_ $name:upper>]: $crate::GUID = $guid;

            #[repr(C)]
            #[derive(Clone, Copy)]
            #[allow(non_snake_case)]
            $vis struct [<$name Vtbl>] {
                pub parent: $($parent_vtable)+,
                $(
                    pub $method: unsafe extern "system" fn(*mut ::core::ffi::c_void $(, $arg_ty)*) -> $ret,
                )*
            }

            unsafe impl $crate::InterfaceVtable for [<$name Vtbl>] {
                const IID: $crate::GUID = [<IID_ $name:upper>];

                #[inline]
                fn is_compatible(riid: &$crate::GUID) -> bool {
                    *riid == [<IID_ $name:upper>]
                        || <$($parent_vtable)+ as $crate::InterfaceVtable>::is_compatible(riid)
                }
            }

            #[allow(dead_code)]
            impl [<$name Vtbl>] {
                /// Compile-time construction of the vtable for `T` hosted by wrapper `W`.
                pub const fn new<T, W>() -> Self
                where
                    T: $name,
                    W: $crate::ComWrapper<T>,
                {
                    Self {
                        parent: <$($parent_vtable)+>::new::<T, W>(),
                        $(
                            $method: Self::[<shim_ $method>]::<T, W>,
                        )*
                    }
                }

                $(
                    unsafe extern "system" fn [<shim_ $method>]<T, W>(
                        this: *mut ::core::ffi::c_void
                        $(, $arg: $arg_ty)*
                    ) -> $ret
                    where
                        T: $name,
                        W: $crate::ComWrapper<T>,
                    {
                        // SAFETY: the vtable is only installed on pointers produced by `W`.
                        let inner = unsafe { W::inner(this) };
                        <T as $name>::$method(inner $(, $arg)*)
                    }
                )*
            }

            impl<T, W> $crate::ComVtable<T, W> for [<$name Vtbl>]
            where
                T: $name,
                W: $crate::ComWrapper<T>,
            {
                const VTABLE: &'static Self = &Self::new::<T, W>();
            }

            #[repr(C)]
            #[allow(non_snake_case)]
            $vis struct [<$name Raw>] {
                pub lpVtbl: *mut [<$name Vtbl>],
            }

            unsafe impl $crate::ComInterface for [<$name Raw>] {}
            unsafe impl $crate::ThreadSafeComInterface for [<$name Raw>] {}

            impl $crate::ComInterfaceInfo for [<$name Raw>] {
                type Vtable = [<$name Vtbl>];
                const IID: $crate::GUID = [<IID_ $name:upper>];
            }

            #[allow(dead_code)]
            impl [<$name Raw>] {
                $(
                    /// # Safety
                    /// `self` must be a live interface pointer whose vtable is this interface's,
                    /// and the arguments must satisfy the callee's contract.
                    #[inline]
                    pub unsafe fn $method(&self $(, $arg: $arg_ty)*) -> $ret {
                        let this = self as *const Self as *mut ::core::ffi::c_void;
                        unsafe { ((*self.lpVtbl).$method)(this $(, $arg)*) }
                    }
                )*
            }

            $crate::__mcom_parent_deref!([<$name Raw>], $($parent_raw)*);
        }
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __mcom_parent_deref {
    ($raw:ident,) => {};
    ($raw:ident, $parent_raw:ident) => {
        impl ::core::ops::Deref for $raw {
            type Target = $parent_raw;

            #[inline]
            fn deref(&self) -> &Self::Target {
                // SAFETY: the parent vtable is the prefix of this interface's vtable.
                unsafe { &*(self as *const Self as *const $parent_raw) }
            }
        }
    };
}

#[macro_export]
/// Adds `new_com`/`new_com_rc` constructors to an implementation type.
///
/// `impl_com_object!(Widget, IWidgetVtbl)` hosts `Widget` in a plain
/// [`ComObject`](crate::wrapper::ComObject); add `, weak` to host it in a
/// [`WeakComObject`](crate::weak::WeakComObject) instead. A trailing
/// `facets(IFooVtbl, IBarVtbl)` adds secondary interface slots.
macro_rules! impl_com_object {
    (@ctors $ty:ty, $host:ty, $vtable:ty) => {
        impl $ty {
            #[inline]
            pub fn new_com(inner: Self) -> $crate::StatusResult<*mut ::core::ffi::c_void> {
                <$host>::new(inner)
            }

            #[inline]
            pub fn new_com_rc<R>(inner: Self) -> $crate::StatusResult<$crate::ComRc<R>>
            where
                R: $crate::ComInterface + $crate::ComInterfaceInfo<Vtable = $vtable>,
            {
                <$host>::new_rc(inner)
            }
        }
    };
    ($ty:ty, $vtable:ty, weak, facets($($facet:ty),+ $(,)?) $(,)?) => {
        $crate::impl_com_object!(
            @ctors $ty,
            $crate::weak::WeakComObject<$ty, $vtable, $crate::GlobalAllocator, ($($facet,)+)>,
            $vtable
        );
    };
    ($ty:ty, $vtable:ty, weak $(,)?) => {
        $crate::impl_com_object!(@ctors $ty, $crate::weak::WeakComObject<$ty, $vtable>, $vtable);
    };
    ($ty:ty, $vtable:ty, facets($($facet:ty),+ $(,)?) $(,)?) => {
        $crate::impl_com_object!(
            @ctors $ty,
            $crate::wrapper::ComObject<$ty, $vtable, $crate::GlobalAllocator, ($($facet,)+)>,
            $vtable
        );
    };
    ($ty:ty, $vtable:ty $(,)?) => {
        $crate::impl_com_object!(@ctors $ty, $crate::wrapper::ComObject<$ty, $vtable>, $vtable);
    };
}
