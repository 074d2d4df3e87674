//! Track references
//!
//! A track is a pointer to a playable file on disk plus the name shown
//! in the playlist.

use std::hash::{ Hash, Hasher };
use std::path::{ Component, Path, PathBuf };


/// Reference to a playable audio file.
///
/// Identity is the normalized absolute path; two tracks with the same
/// path are the same file even if they sit at different playlist slots
/// or carry different display names.
#[derive( Debug, Clone )]
pub struct Track {
    path: PathBuf,
    display_name: String,
}


impl Track {
    /// Creates a track from a file path.
    ///
    /// Relative paths are resolved against the working directory. The
    /// display name is the file name component.
    pub fn from_path( path: impl AsRef<Path> ) -> Self {
        let path = normalize( path.as_ref() );
        let display_name = path
            .file_name()
            .map( |n| n.to_string_lossy().into_owned() )
            .unwrap_or_else( || path.to_string_lossy().into_owned() );

        Self { path, display_name }
    }


    /// Creates a track with an explicit display name, as stored by the
    /// playlist database.
    pub fn with_name( path: impl Into<PathBuf>, display_name: impl Into<String> ) -> Self {
        Self {
            path: normalize( &path.into() ),
            display_name: display_name.into(),
        }
    }


    /// Gets the absolute file path.
    pub fn path( &self ) -> &Path {
        &self.path
    }


    /// Gets the name shown in the playlist.
    pub fn display_name( &self ) -> &str {
        &self.display_name
    }


    /// Returns true if the file still exists on disk.
    pub fn exists( &self ) -> bool {
        self.path.exists()
    }


    /// Checks the display name against a search query.
    ///
    /// Case-insensitive; a name matches when it starts with or contains
    /// the query. A blank query matches everything.
    pub fn matches( &self, query: &str ) -> bool {
        matches_query( &self.display_name, query )
    }
}


impl PartialEq for Track {
    fn eq( &self, other: &Self ) -> bool {
        self.path == other.path
    }
}


impl Eq for Track {}


impl Hash for Track {
    fn hash<H: Hasher>( &self, state: &mut H ) {
        self.path.hash( state );
    }
}


/// Makes `path` absolute and folds away `.` and `..` components without
/// touching the filesystem.
fn normalize( path: &Path ) -> PathBuf {
    let absolute = std::path::absolute( path ).unwrap_or_else( |_| path.to_path_buf() );

    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            // Popping past the root leaves the root
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push( other.as_os_str() ),
        }
    }
    normalized
}


/// Search policy shared by the playlist filter and the playlist store.
pub fn matches_query( name: &str, query: &str ) -> bool {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return true;
    }

    let name = name.to_lowercase();
    name.starts_with( &query ) || name.contains( &query )
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_display_name_is_file_name() {
        let track = Track::from_path( "/music/Abba - Song.wav" );
        assert_eq!( track.display_name(), "Abba - Song.wav" );
        assert_eq!( track.path(), Path::new( "/music/Abba - Song.wav" ) );
    }


    #[test]
    fn test_relative_path_is_made_absolute() {
        let track = Track::from_path( "song.wav" );
        assert!( track.path().is_absolute() );
    }


    #[test]
    fn test_dot_segments_are_folded() {
        let track = Track::from_path( "/music/x/../a.wav" );
        assert_eq!( track.path(), Path::new( "/music/a.wav" ) );
        assert_eq!( track, Track::from_path( "/music/./a.wav" ) );
        assert_eq!( Track::from_path( "/../a.wav" ).path(), Path::new( "/a.wav" ) );
    }


    #[test]
    fn test_stored_paths_are_normalized_too() {
        let stored = Track::with_name( "/music/x/../a.wav", "A" );
        assert_eq!( stored.path(), Path::new( "/music/a.wav" ) );
        assert_eq!( stored.display_name(), "A" );
    }


    #[test]
    fn test_identity_ignores_display_name() {
        use std::collections::HashSet;

        let a = Track::with_name( "/music/a.wav", "A" );
        let b = Track::with_name( "/music/a.wav", "B" );
        assert_eq!( a, b );
        assert_ne!( a, Track::with_name( "/music/b.wav", "A" ) );

        let set: HashSet<Track> = [ a, b ].into_iter().collect();
        assert_eq!( set.len(), 1 );
    }


    #[test]
    fn test_matches_is_case_insensitive() {
        assert!( matches_query( "Abba - Song", "ab" ) );
        assert!( matches_query( "Crab Walk", "AB" ) );
        assert!( !matches_query( "Song", "xyz" ) );
    }


    #[test]
    fn test_contains_matches_inside_a_word() {
        assert!( matches_query( "Table", "ab" ) );
        assert!( matches_query( "Table", "  AB  " ) );
    }


    #[test]
    fn test_blank_query_matches_everything() {
        assert!( matches_query( "anything", "   " ) );
    }
}
