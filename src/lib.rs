pub mod api;
pub mod core;
pub mod models;

pub fn init_logging() {
    #[cfg(target_os = "android")]
    {
        android_logger::init_once(
            android_logger::Config::default()
                .with_max_level(log::LevelFilter::Debug)
                .with_tag("flowframe_lib"),
        );
    }

    #[cfg(not(target_os = "android"))]
    {
        // 重复初始化时忽略错误
        let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
            .try_init();
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_init_logging_is_idempotent() {
        super::init_logging();
        super::init_logging();
        log::info!("logging ready");
    }
}
