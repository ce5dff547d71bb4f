pub mod api;
pub mod core;

pub fn init_logging() {
    #[cfg(target_os = "android")]
    {
        android_logger::init_once(
            android_logger::Config::default()
                .with_max_level(log::LevelFilter::Debug)
                .with_tag("detect_overlay_rust"),
        );
    }

    #[cfg(not(target_os = "android"))]
    {
        // 桌面/测试环境，RUST_LOG 可覆盖
        let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
            .try_init();
    }
}
