//! Builds the environment handed to the function container.
//!
//! User config is layered app first, then route/function, and the `FN_*` keys
//! are written last so they always win. User code reads these names, so they
//! must not change.

use faas_common::{App, CallType, Config, Function, Route, Trigger};

pub const FN_FORMAT: &str = "FN_FORMAT";
pub const FN_APP_NAME: &str = "FN_APP_NAME";
pub const FN_PATH: &str = "FN_PATH";
pub const FN_MEMORY: &str = "FN_MEMORY";
pub const FN_TYPE: &str = "FN_TYPE";
pub const FN_TMPSIZE: &str = "FN_TMPSIZE";
pub const FN_CPUS: &str = "FN_CPUS";
pub const FN_FN_ID: &str = "FN_FN_ID";

fn layered(base: &Config, over: &Config) -> Config {
    let mut conf = base.clone();
    conf.extend(over.iter().map(|(k, v)| (k.clone(), v.clone())));
    conf
}

pub fn build_route_config(app: &App, route: &Route) -> Config {
    let mut conf = layered(&app.config, &route.config);

    conf.insert(
        FN_FORMAT.to_string(),
        route.format.unwrap_or_default().to_string(),
    );
    conf.insert(FN_APP_NAME.to_string(), app.name.clone());
    conf.insert(FN_PATH.to_string(), route.path.clone());
    conf.insert(FN_MEMORY.to_string(), route.memory.to_string());
    conf.insert(FN_TYPE.to_string(), route.call_type.to_string());
    conf.insert(FN_TMPSIZE.to_string(), route.tmpfs_size.to_string());

    if !route.cpus.is_zero() {
        conf.insert(FN_CPUS.to_string(), route.cpus.to_string());
    }
    conf
}

pub fn build_trigger_config(app: &App, function: &Function, trigger: &Trigger) -> Config {
    let mut conf = layered(&app.config, &function.config);

    conf.insert(
        FN_FORMAT.to_string(),
        function.format.unwrap_or_default().to_string(),
    );
    conf.insert(FN_APP_NAME.to_string(), app.name.clone());
    conf.insert(FN_PATH.to_string(), trigger.source.clone());
    conf.insert(FN_MEMORY.to_string(), function.memory.to_string());
    conf.insert(FN_TYPE.to_string(), CallType::Sync.to_string());
    conf.insert(FN_FN_ID.to_string(), function.id.clone());
    conf
}

#[cfg(test)]
mod tests {
    use super::*;
    use faas_common::{Format, MilliCpus};

    fn app() -> App {
        App {
            id: "app-id".to_string(),
            name: "myapp".to_string(),
            config: Config::from([
                ("SHARED".to_string(), "from-app".to_string()),
                ("APP_ONLY".to_string(), "a".to_string()),
                ("FN_MEMORY".to_string(), "999999".to_string()),
            ]),
            ..Default::default()
        }
    }

    #[test]
    fn test_route_config_layering() {
        let route = Route {
            app_id: "app-id".to_string(),
            path: "/hello".to_string(),
            image: "fnproject/hello".to_string(),
            call_type: CallType::Async,
            format: Some(Format::Json),
            memory: 256,
            tmpfs_size: 32,
            config: Config::from([
                ("SHARED".to_string(), "from-route".to_string()),
                ("FN_PATH".to_string(), "/spoofed".to_string()),
            ]),
            ..Default::default()
        };

        let conf = build_route_config(&app(), &route);
        assert_eq!(conf["SHARED"], "from-route");
        assert_eq!(conf["APP_ONLY"], "a");
        assert_eq!(conf[FN_MEMORY], "256");
        assert_eq!(conf[FN_PATH], "/hello");
        assert_eq!(conf[FN_FORMAT], "json");
        assert_eq!(conf[FN_APP_NAME], "myapp");
        assert_eq!(conf[FN_TYPE], "async");
        assert_eq!(conf[FN_TMPSIZE], "32");
        assert!(!conf.contains_key(FN_CPUS));
    }

    #[test]
    fn test_route_config_cpus_and_default_format() {
        let route = Route {
            path: "/cpu".to_string(),
            cpus: MilliCpus(1500),
            ..Default::default()
        };
        let conf = build_route_config(&app(), &route);
        assert_eq!(conf[FN_CPUS], "1500m");
        assert_eq!(conf[FN_FORMAT], "default");
        assert_eq!(conf[FN_MEMORY], "128");
    }

    #[test]
    fn test_trigger_config() {
        let function = Function {
            id: "fn-id".to_string(),
            memory: 64,
            format: Some(Format::Http),
            config: Config::from([("SHARED".to_string(), "from-fn".to_string())]),
            ..Default::default()
        };
        let trigger = Trigger {
            source: "/trigger/src".to_string(),
            ..Default::default()
        };

        let conf = build_trigger_config(&app(), &function, &trigger);
        assert_eq!(conf["SHARED"], "from-fn");
        assert_eq!(conf[FN_PATH], "/trigger/src");
        assert_eq!(conf[FN_MEMORY], "64");
        assert_eq!(conf[FN_TYPE], "sync");
        assert_eq!(conf[FN_FORMAT], "http");
        assert_eq!(conf[FN_FN_ID], "fn-id");
        assert!(!conf.contains_key(FN_TMPSIZE));
    }

    #[test]
    fn test_deterministic() {
        let route = Route {
            path: "/same".to_string(),
            ..Default::default()
        };
        assert_eq!(
            build_route_config(&app(), &route),
            build_route_config(&app(), &route)
        );
    }
}
