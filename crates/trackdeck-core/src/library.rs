//! Library scanning
//!
//! Turns files and folders picked by the user into playlist tracks.
//! Folders are walked recursively for audio files; files named
//! explicitly are taken as they are.

use std::path::{ Path, PathBuf };

use thiserror::Error;

use crate::track::Track;


/// Supported audio file extensions.
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "mp3", "flac", "ogg", "wav", "m4a", "aac", "opus", "aiff", "aif", "caf",
];


/// Errors that can occur during library operations.
#[derive( Debug, Error )]
pub enum LibraryError {
    #[error( "IO error: {0}" )]
    Io( #[from] std::io::Error ),

    #[error( "Path not found: {0}" )]
    NotFound( PathBuf ),
}


/// Collects tracks from files and folders.
#[derive( Debug, Default )]
pub struct LibraryScanner {
    paths: Vec<PathBuf>,
}


impl LibraryScanner {
    pub fn new() -> Self {
        Self::default()
    }


    /// Queues a file or folder. Duplicates are ignored.
    pub fn add_path( &mut self, path: impl Into<PathBuf> ) {
        let path = path.into();
        if !self.paths.contains( &path ) {
            self.paths.push( path );
        }
    }


    pub fn paths( &self ) -> &[PathBuf] {
        &self.paths
    }


    /// Scans every queued path, in the order they were added.
    ///
    /// @returns Tracks in path order, each folder's contents sorted by path
    pub fn scan( &self ) -> Result<Vec<Track>, LibraryError> {
        let mut tracks = Vec::new();

        for path in &self.paths {
            if path.is_dir() {
                tracing::info!( "Scanning: {:?}", path );
                let mut found = Vec::new();
                scan_recursive( path, &mut found )?;
                found.sort();
                tracks.extend( found.into_iter().map( Track::from_path ) );
            } else if path.exists() {
                tracks.push( Track::from_path( path ) );
            } else {
                return Err( LibraryError::NotFound( path.clone() ) );
            }
        }

        tracing::info!( "Found {} tracks", tracks.len() );
        Ok( tracks )
    }
}


fn scan_recursive( dir: &Path, found: &mut Vec<PathBuf> ) -> Result<(), LibraryError> {
    let entries = match std::fs::read_dir( dir ) {
        Ok( e ) => e,
        Err( e ) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            tracing::warn!( "Access denied: {:?}", dir );
            return Ok(());
        }
        Err( e ) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err( LibraryError::NotFound( dir.to_path_buf() ) );
        }
        Err( e ) => return Err( LibraryError::Io( e ) ),
    };

    for entry in entries.flatten() {
        let path = entry.path();

        if path.is_dir() {
            scan_recursive( &path, found )?;
        } else if is_audio_file( &path ) {
            found.push( path );
        }
    }

    Ok(())
}


/// Checks if a file has a supported audio extension.
pub fn is_audio_file( path: &Path ) -> bool {
    path.extension()
        .and_then( |e| e.to_str() )
        .map( |e| SUPPORTED_EXTENSIONS.contains( &e.to_lowercase().as_str() ) )
        .unwrap_or( false )
}


#[cfg( test )]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;


    fn touch( path: &Path ) {
        if let Some( parent ) = path.parent() {
            fs::create_dir_all( parent ).unwrap();
        }
        fs::write( path, b"" ).unwrap();
    }


    #[test]
    fn test_is_audio_file() {
        assert!( is_audio_file( Path::new( "song.mp3" ) ) );
        assert!( is_audio_file( Path::new( "SONG.FLAC" ) ) );
        assert!( !is_audio_file( Path::new( "cover.jpg" ) ) );
        assert!( !is_audio_file( Path::new( "README" ) ) );
    }


    #[test]
    fn test_scan_folder_recursively_and_sorted() {
        let dir = TempDir::new().unwrap();
        touch( &dir.path().join( "b.wav" ) );
        touch( &dir.path().join( "a.mp3" ) );
        touch( &dir.path().join( "cover.jpg" ) );
        touch( &dir.path().join( "disc2" ).join( "c.flac" ) );

        let mut scanner = LibraryScanner::new();
        scanner.add_path( dir.path() );
        let names: Vec<String> = scanner.scan().unwrap()
            .iter()
            .map( |t| t.display_name().to_string() )
            .collect();

        assert_eq!( names, vec![ "a.mp3", "b.wav", "c.flac" ] );
    }


    #[test]
    fn test_explicit_files_keep_order() {
        let dir = TempDir::new().unwrap();
        let second = dir.path().join( "z.wav" );
        let first = dir.path().join( "notes.txt" );
        touch( &second );
        touch( &first );

        let mut scanner = LibraryScanner::new();
        scanner.add_path( &second );
        scanner.add_path( &first );
        scanner.add_path( &second );

        let tracks = scanner.scan().unwrap();
        assert_eq!( tracks.len(), 2 );
        assert_eq!( tracks[ 0 ].display_name(), "z.wav" );
        assert_eq!( tracks[ 1 ].display_name(), "notes.txt" );
    }


    #[test]
    fn test_missing_path_fails() {
        let dir = TempDir::new().unwrap();
        let mut scanner = LibraryScanner::new();
        scanner.add_path( dir.path().join( "gone" ) );

        assert!( matches!( scanner.scan(), Err( LibraryError::NotFound( _ ) ) ) );
    }
}
