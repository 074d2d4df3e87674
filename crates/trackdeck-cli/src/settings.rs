//! Application settings management
//!
//! Volume and repeat survive restarts; the database location and log
//! filter can be pinned by hand.

use std::fs;
use std::path::{ Path, PathBuf };

use serde::{ Deserialize, Serialize };


/// Application settings.
#[derive( Debug, Clone, PartialEq, Serialize, Deserialize )]
#[serde( default )]
pub struct Settings {
    /// Volume percentage applied at startup
    pub volume: u8,

    /// Repeat the current track instead of advancing
    pub repeat: bool,

    /// Playlist database, if not the default location
    pub database: Option<PathBuf>,

    /// `tracing` filter directive used when RUST_LOG is unset
    pub log_filter: Option<String>,
}


impl Default for Settings {
    fn default() -> Self {
        Self {
            volume: trackdeck_core::engine::DEFAULT_VOLUME,
            repeat: false,
            database: None,
            log_filter: None,
        }
    }
}


impl Settings {
    /// Returns the path to the settings file.
    pub fn settings_path() -> Option<PathBuf> {
        dirs::config_dir().map( |p| p.join( "trackdeck" ).join( "settings.json" ) )
    }


    /// Loads settings from the default location.
    pub fn load() -> Self {
        Self::settings_path()
            .map( |p| Self::load_from( &p ) )
            .unwrap_or_default()
    }


    /// Loads settings from `path`, falling back to defaults if the file
    /// is missing or unreadable.
    pub fn load_from( path: &Path ) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string( path ) {
            Ok( contents ) => match serde_json::from_str::<Self>( &contents ) {
                Ok( mut settings ) => {
                    settings.volume = settings.volume.min( 100 );
                    settings
                }
                Err( e ) => {
                    tracing::warn!( "Ignoring malformed settings {:?}: {}", path, e );
                    Self::default()
                }
            },
            Err( e ) => {
                tracing::warn!( "Failed to read settings: {}", e );
                Self::default()
            }
        }
    }


    /// Saves settings to the default location.
    pub fn save( &self ) {
        if let Some( path ) = Self::settings_path() {
            self.save_to( &path );
        }
    }


    /// Saves settings to `path`. Failures are logged, not returned.
    pub fn save_to( &self, path: &Path ) {
        if let Some( parent ) = path.parent() {
            if let Err( e ) = fs::create_dir_all( parent ) {
                tracing::warn!( "Failed to create settings directory: {}", e );
                return;
            }
        }

        match serde_json::to_string_pretty( self ) {
            Ok( json ) => {
                if let Err( e ) = fs::write( path, json ) {
                    tracing::warn!( "Failed to save settings: {}", e );
                }
            }
            Err( e ) => {
                tracing::warn!( "Failed to serialize settings: {}", e );
            }
        }
    }
}


#[cfg( test )]
mod tests {
    use super::*;
    use tempfile::TempDir;


    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let settings = Settings::load_from( &dir.path().join( "settings.json" ) );
        assert_eq!( settings, Settings::default() );
        assert_eq!( settings.volume, 70 );
    }


    #[test]
    fn test_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join( "nested" ).join( "settings.json" );
        let settings = Settings {
            volume: 35,
            repeat: true,
            database: Some( PathBuf::from( "/srv/trackdeck.db" ) ),
            log_filter: Some( "trackdeck=debug".into() ),
        };

        settings.save_to( &path );
        assert_eq!( Settings::load_from( &path ), settings );
    }


    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join( "settings.json" );
        fs::write( &path, r#"{ "repeat": true, "volume": 250 }"# ).unwrap();

        let settings = Settings::load_from( &path );
        assert!( settings.repeat );
        assert_eq!( settings.volume, 100 );
        assert!( settings.database.is_none() );
    }


    #[test]
    fn test_malformed_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join( "settings.json" );
        fs::write( &path, "{ not json" ).unwrap();

        assert_eq!( Settings::load_from( &path ), Settings::default() );
    }
}
