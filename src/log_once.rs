/// Logs at warn level the first time a call site fires and at info level
/// afterwards, keeping repeated client mistakes out of the warning stream.
#[macro_export]
macro_rules! warn_once_or_info {
    ($($t:tt)*) => {{
        static FIRED: std::sync::OnceLock<std::marker::PhantomData<bool>> =
            std::sync::OnceLock::new();
        log::log!(match FIRED.set(std::marker::PhantomData) {
            Ok(()) => log::Level::Warn,
            Err(_) => log::Level::Info,
        },$($t)*);
    }};
}
