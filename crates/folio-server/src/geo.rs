use std::net::IpAddr;
use std::path::Path;
use std::str::FromStr;

use tracing::warn;

/// MaxMind country lookups.
///
/// The database is loaded once at startup. When the file is absent every
/// lookup returns `None` and visits are stored without a country.
pub struct GeoLookup {
    reader: Option<maxminddb::Reader<Vec<u8>>>,
}

impl GeoLookup {
    pub fn open(path: &str) -> Self {
        if !Path::new(path).exists() {
            warn!(
                geoip_path = %path,
                "GeoIP database not found. Visits stored without country."
            );
            return Self::disabled();
        }
        match maxminddb::Reader::open_readfile(path) {
            Ok(reader) => Self {
                reader: Some(reader),
            },
            Err(e) => {
                warn!(geoip_path = %path, error = %e, "Failed to open GeoIP database");
                Self::disabled()
            }
        }
    }

    pub fn disabled() -> Self {
        Self { reader: None }
    }

    /// ISO 3166 country code for `ip`, if the database knows it.
    pub fn country(&self, ip: &str) -> Option<String> {
        let reader = self.reader.as_ref()?;
        let addr = IpAddr::from_str(ip).ok()?;
        let city = reader
            .lookup(addr)
            .ok()?
            .decode::<maxminddb::geoip2::City>()
            .ok()??;
        city.country.iso_code.map(|code| code.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_database_disables_lookup() {
        let geo = GeoLookup::open("/nonexistent/GeoLite2-City.mmdb");
        assert_eq!(geo.country("8.8.8.8"), None);
    }

    #[test]
    fn garbage_ip_is_none() {
        assert_eq!(GeoLookup::disabled().country("not-an-ip"), None);
    }
}
