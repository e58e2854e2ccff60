//! Data source and driver enumeration.
//!
//! Both listings are read in two passes: the first walks the list with
//! empty buffers to learn the longest entries, the second reads every entry
//! with buffers large enough to avoid truncation.

use std::collections::HashMap;

use super::{Environment, OdbcVersion};
use crate::error::Result;
use crate::ffi::{FetchOrientation, NativeApi, RawHandle, SqlReturn};
use crate::outcome::Outcome;

/// Name and description of a configured data source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSourceInfo {
    pub name: String,
    /// Usually the name of the driver serving the data source.
    pub description: String,
}

/// Description and attributes of an installed driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverInfo {
    pub description: String,
    pub attributes: HashMap<String, String>,
}

/// Which data sources to list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataSourceScope {
    #[default]
    All,
    User,
    System,
}

impl DataSourceScope {
    const fn first(self) -> FetchOrientation {
        match self {
            Self::All => FetchOrientation::First,
            Self::User => FetchOrientation::FirstUser,
            Self::System => FetchOrientation::FirstSystem,
        }
    }
}

type ListCall = fn(
    &dyn NativeApi,
    RawHandle,
    FetchOrientation,
    &mut [u8],
    &mut i16,
    &mut [u8],
    &mut i16,
) -> SqlReturn;

impl<V: OdbcVersion> Environment<'_, V> {
    /// Lists configured data sources.
    pub fn data_sources(&self, scope: DataSourceScope) -> Result<Vec<DataSourceInfo>> {
        let entries = self.list("SQLDataSources", scope.first(), |api, raw, dir, a, al, b, bl| {
            api.data_sources(raw, dir, a, al, b, bl)
        })?;
        Ok(entries
            .into_iter()
            .map(|(name, description)| DataSourceInfo {
                name: decode_text(&name),
                description: decode_text(&description),
            })
            .collect())
    }

    /// Lists installed drivers.
    pub fn drivers(&self) -> Result<Vec<DriverInfo>> {
        let entries = self.list("SQLDrivers", FetchOrientation::First, |api, raw, dir, a, al, b, bl| {
            api.drivers(raw, dir, a, al, b, bl)
        })?;
        Ok(entries
            .into_iter()
            .map(|(description, attributes)| DriverInfo {
                description: decode_text(&description),
                attributes: parse_attributes(&attributes),
            })
            .collect())
    }

    fn list(
        &self,
        function: &'static str,
        first: FetchOrientation,
        call: ListCall,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let handle = self.handle();

        // Pass 1: longest entries.
        let (mut max_first, mut max_second, mut count) = (0_usize, 0_usize, 0_usize);
        let mut direction = first;
        loop {
            let (mut first_len, mut second_len) = (0_i16, 0_i16);
            let outcome = handle.invoke(function, |api, raw| {
                call(api, raw, direction, &mut [], &mut first_len, &mut [], &mut second_len)
            })?;
            match outcome {
                Outcome::NoData => break,
                Outcome::Success | Outcome::SuccessWithInfo => {
                    max_first = max_first.max(usize::try_from(first_len).unwrap_or(0));
                    max_second = max_second.max(usize::try_from(second_len).unwrap_or(0));
                    count += 1;
                }
                other => {
                    handle.attach(function, other)?;
                }
            }
            direction = FetchOrientation::Next;
        }

        // Pass 2: full entries.
        let mut entries = Vec::with_capacity(count);
        let mut first_buf = vec![0_u8; max_first + 1];
        let mut second_buf = vec![0_u8; max_second + 1];
        let mut direction = first;
        loop {
            let (mut first_len, mut second_len) = (0_i16, 0_i16);
            let checked = handle.call(function, |api, raw| {
                call(
                    api,
                    raw,
                    direction,
                    &mut first_buf,
                    &mut first_len,
                    &mut second_buf,
                    &mut second_len,
                )
            })?;
            if checked.outcome == Outcome::NoData {
                break;
            }
            checked.success()?;
            entries.push((
                written(&first_buf, first_len).to_vec(),
                written(&second_buf, second_len).to_vec(),
            ));
            direction = FetchOrientation::Next;
        }

        tracing::debug!(function, entries = entries.len(), "enumeration finished");
        Ok(entries)
    }
}

/// Bytes the driver wrote, bounded by the buffer minus its terminator.
fn written(buffer: &[u8], length: i16) -> &[u8] {
    let length = usize::try_from(length).unwrap_or(0);
    &buffer[..length.min(buffer.len().saturating_sub(1))]
}

fn decode_text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Parses `key=value` pairs separated by NUL, ending at the first empty
/// pair.
fn parse_attributes(bytes: &[u8]) -> HashMap<String, String> {
    decode_text(bytes)
        .split('\0')
        .take_while(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) => (key.to_string(), value.to_string()),
            None => (pair.to_string(), String::new()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OdbcConfig;
    use crate::context::OdbcContext;
    use crate::environment::{Environment, Odbc3};
    use crate::testing::{MockDriver, MockFunction};

    #[test]
    fn test_parse_attributes() {
        let raw = b"APILevel=2\0ConnectFunctions=YYY\0CPTimeout=60\0DriverODBCVer=03.50\0\
FileUsage=0\0OOPS=\0SQLLevel=1\0UsageCount=1\0\0";
        let attributes = parse_attributes(raw);
        assert_eq!(attributes.len(), 8);
        assert_eq!(attributes["APILevel"], "2");
        assert_eq!(attributes["ConnectFunctions"], "YYY");
        assert_eq!(attributes["DriverODBCVer"], "03.50");
        assert_eq!(attributes["OOPS"], "");
        assert_eq!(attributes["UsageCount"], "1");
    }

    #[test]
    fn test_parse_attributes_value_with_equals() {
        let attributes = parse_attributes(b"Setup=a=b\0\0");
        assert_eq!(attributes["Setup"], "a=b");
    }

    #[test]
    fn test_written_clamps_to_buffer() {
        assert_eq!(written(b"abc\0", 10), b"abc");
        assert_eq!(written(b"abc\0", 2), b"ab");
        assert_eq!(written(b"", 3), b"");
    }

    #[test]
    fn test_data_sources_by_scope() {
        let driver = MockDriver::new();
        driver.add_data_source("TESTDB", "Mock Driver", "u", "p");
        driver.add_system_data_source("WAREHOUSE", "Mock Driver (system)");
        let ctx = OdbcContext::new(driver.clone(), OdbcConfig::default());
        let env = Environment::new(&ctx)
            .unwrap()
            .declare_version::<Odbc3>()
            .unwrap()
            .into_value();

        let all = env.data_sources(DataSourceScope::All).unwrap();
        assert_eq!(
            all,
            vec![
                DataSourceInfo {
                    name: "TESTDB".into(),
                    description: "Mock Driver".into()
                },
                DataSourceInfo {
                    name: "WAREHOUSE".into(),
                    description: "Mock Driver (system)".into()
                },
            ]
        );
        let system = env.data_sources(DataSourceScope::System).unwrap();
        assert_eq!(system.len(), 1);
        assert_eq!(system[0].name, "WAREHOUSE");
        let user = env.data_sources(DataSourceScope::User).unwrap();
        assert_eq!(user.len(), 1);
        assert_eq!(user[0].name, "TESTDB");

        // Sizing pass truncates on purpose; no diagnostics are pulled for it.
        assert_eq!(driver.call_count(MockFunction::GetDiagRec), 0);
    }

    #[test]
    fn test_drivers() {
        let driver = MockDriver::new();
        driver.add_driver("Mock Driver", &[("APILevel", "2"), ("FileUsage", "0")]);
        driver.add_driver("Other", &[]);
        let ctx = OdbcContext::new(driver, OdbcConfig::default());
        let env = Environment::new(&ctx)
            .unwrap()
            .declare_version::<Odbc3>()
            .unwrap()
            .into_value();

        let drivers = env.drivers().unwrap();
        assert_eq!(drivers.len(), 2);
        assert_eq!(drivers[0].description, "Mock Driver");
        assert_eq!(drivers[0].attributes["APILevel"], "2");
        assert_eq!(drivers[0].attributes["FileUsage"], "0");
        assert!(drivers[1].attributes.is_empty());
    }

    #[test]
    fn test_empty_listing() {
        let ctx = OdbcContext::new(MockDriver::new(), OdbcConfig::default());
        let env = Environment::new(&ctx)
            .unwrap()
            .declare_version::<Odbc3>()
            .unwrap()
            .into_value();
        assert!(env.data_sources(DataSourceScope::All).unwrap().is_empty());
        assert!(env.drivers().unwrap().is_empty());
    }
}
