/// Exports `new`, `free` and `update` C entry points for a [`Model`](crate::Model).
///
/// ```ignore
/// export_engine!(DistanceModel, app_interface_new, app_interface_free, app_interface_update);
/// ```
///
/// `free` ignores null. `update` with a null engine or null input returns a
/// zeroed output instead of dereferencing it.
#[macro_export]
macro_rules! export_engine {
    ($model:ty, $new:ident, $free:ident, $update:ident) => {
        #[no_mangle]
        pub extern "C" fn $new() -> *mut ::simbridge_sys::AppInterface {
            let model: ::std::boxed::Box<$model> =
                ::std::boxed::Box::new(<$model as ::core::default::Default>::default());
            ::std::boxed::Box::into_raw(model).cast()
        }

        /// # Safety
        /// `app` must be null or a pointer returned by the matching `new` that
        /// has not been freed yet.
        #[no_mangle]
        pub unsafe extern "C" fn $free(app: *mut ::simbridge_sys::AppInterface) {
            if app.is_null() {
                return;
            }
            drop(::std::boxed::Box::from_raw(app.cast::<$model>()));
        }

        /// # Safety
        /// `app` must be null or a live pointer from the matching `new`, and
        /// `input_data` must be null or point to a valid input sample.
        #[no_mangle]
        pub unsafe extern "C" fn $update(
            app: *mut ::simbridge_sys::AppInterface,
            app_time_s: f64,
            input_data: *mut <$model as $crate::Model>::Input,
        ) -> <$model as $crate::Model>::Output {
            let (Some(model), Some(input)) = (app.cast::<$model>().as_mut(), input_data.as_ref())
            else {
                return ::core::default::Default::default();
            };
            $crate::Model::update(model, app_time_s, input)
        }
    };
}
