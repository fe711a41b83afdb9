mod test_refresh;
mod test_settings_env;
