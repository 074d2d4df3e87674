//! Playlist persistence
//!
//! Saved playlists live in a small SQLite database keyed by user id.
//! Saving replaces a user's whole playlist in one transaction; loading
//! and searching skip entries whose files have disappeared.

use std::fs;
use std::path::{ Path, PathBuf };

use rusqlite::{ params, Connection };
use thiserror::Error;

use crate::track::{ matches_query, Track };


const DATABASE_FILENAME: &str = "trackdeck.db";

const CREATE_TABLES: &str = r"
    CREATE TABLE IF NOT EXISTS playlist(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL,
        name TEXT NOT NULL,
        path TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS playlist_user ON playlist(user_id);
";

const DELETE_USER_PLAYLIST: &str = "
    DELETE FROM playlist WHERE user_id = ?1
";

const INSERT_ENTRY: &str = "
    INSERT INTO playlist (user_id, name, path)
    VALUES (?1, ?2, ?3)
";

const GET_USER_PLAYLIST: &str = "
    SELECT name, path FROM playlist
    WHERE user_id = ?1
    ORDER BY id ASC
";

const DELETE_ENTRY: &str = "
    DELETE FROM playlist WHERE user_id = ?1 AND path = ?2
";


/// Errors from the playlist store.
#[derive( Debug, Error )]
pub enum StoreError {
    #[error( "Database error: {0}" )]
    Database( #[from] rusqlite::Error ),

    #[error( "IO error: {0}" )]
    Io( #[from] std::io::Error ),
}


/// Opaque user identifier issued by whoever authenticated the user.
#[derive( Debug, Clone, Copy, PartialEq, Eq, Hash )]
pub struct UserId( pub i64 );


/// A loaded playlist.
#[derive( Debug, Clone, Default, PartialEq, Eq )]
pub struct LoadedPlaylist {
    pub tracks: Vec<Track>,
    /// True if entries were dropped because their file is gone.
    pub skipped_missing: bool,
}


/// Storage for per-user playlists.
pub trait PlaylistStore {
    /// Replaces the user's saved playlist.
    fn save( &mut self, user: UserId, tracks: &[Track] ) -> Result<(), StoreError>;

    /// Loads the user's playlist in saved order, skipping missing files.
    fn load( &mut self, user: UserId ) -> Result<LoadedPlaylist, StoreError>;

    /// Finds saved tracks whose name matches `keyword` and still exist.
    fn search( &mut self, user: UserId, keyword: &str ) -> Result<Vec<Track>, StoreError>;

    /// Deletes saved entries with the given tracks' paths.
    fn remove( &mut self, user: UserId, tracks: &[Track] ) -> Result<(), StoreError>;
}


/// SQLite-backed playlist store.
pub struct SqliteStore {
    conn: Connection,
}


impl SqliteStore {
    /// Opens (creating if needed) the database at `path`.
    pub fn open( path: &Path ) -> Result<Self, StoreError> {
        if let Some( parent ) = path.parent() {
            fs::create_dir_all( parent )?;
        }

        let conn = Connection::open( path )?;
        conn.pragma_update( None, "journal_mode", "WAL" )?;

        tracing::info!( "Opened playlist database {:?}", path );
        Self::init( conn )
    }


    /// Opens a throwaway in-memory database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init( Connection::open_in_memory()? )
    }


    fn init( mut conn: Connection ) -> Result<Self, StoreError> {
        let tx = conn.transaction()?;
        tx.execute_batch( CREATE_TABLES )?;
        tx.commit()?;

        Ok( Self { conn } )
    }


    /// Default database location under the platform data directory.
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_local_dir().map( |d| d.join( "trackdeck" ).join( DATABASE_FILENAME ) )
    }


    fn entries( &self, user: UserId ) -> Result<Vec<Track>, StoreError> {
        let mut stmt = self.conn.prepare_cached( GET_USER_PLAYLIST )?;
        let rows = stmt.query_map( params![ user.0 ], |row| {
            let name: String = row.get( 0 )?;
            let path: String = row.get( 1 )?;
            Ok( Track::with_name( PathBuf::from( path ), name ) )
        })?;

        let tracks = rows.collect::<Result<Vec<_>, _>>()?;
        Ok( tracks )
    }
}


impl PlaylistStore for SqliteStore {
    fn save( &mut self, user: UserId, tracks: &[Track] ) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        {
            tx.execute( DELETE_USER_PLAYLIST, params![ user.0 ] )?;

            let mut stmt = tx.prepare_cached( INSERT_ENTRY )?;
            for track in tracks {
                stmt.execute( params![
                    user.0,
                    track.display_name(),
                    track.path().to_string_lossy()
                ])?;
            }
        }
        tx.commit()?;

        tracing::info!( "Saved {} tracks for user {}", tracks.len(), user.0 );
        Ok(())
    }


    fn load( &mut self, user: UserId ) -> Result<LoadedPlaylist, StoreError> {
        let mut loaded = LoadedPlaylist::default();

        for track in self.entries( user )? {
            if track.exists() {
                loaded.tracks.push( track );
            } else {
                tracing::warn!( "Skipping missing file {:?}", track.path() );
                loaded.skipped_missing = true;
            }
        }

        Ok( loaded )
    }


    fn search( &mut self, user: UserId, keyword: &str ) -> Result<Vec<Track>, StoreError> {
        Ok( self.entries( user )?
            .into_iter()
            .filter( |t| matches_query( t.display_name(), keyword ) && t.exists() )
            .collect() )
    }


    fn remove( &mut self, user: UserId, tracks: &[Track] ) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached( DELETE_ENTRY )?;
            for track in tracks {
                stmt.execute( params![ user.0, track.path().to_string_lossy() ] )?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}


#[cfg( test )]
mod tests {
    use super::*;
    use tempfile::TempDir;


    struct Fixture {
        dir: TempDir,
        store: SqliteStore,
    }


    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let store = SqliteStore::open( &dir.path().join( "db" ).join( "playlists.db" ) ).unwrap();
            Self { dir, store }
        }


        fn file( &self, name: &str ) -> Track {
            let path = self.dir.path().join( name );
            fs::write( &path, b"" ).unwrap();
            Track::from_path( path )
        }


        fn ghost( &self, name: &str ) -> Track {
            Track::from_path( self.dir.path().join( name ) )
        }
    }


    fn names( tracks: &[Track] ) -> Vec<&str> {
        tracks.iter().map( |t| t.display_name() ).collect()
    }


    #[test]
    fn test_save_then_load_keeps_order() {
        let mut f = Fixture::new();
        let tracks = vec![ f.file( "c.wav" ), f.file( "a.wav" ), f.file( "b.wav" ) ];
        f.store.save( UserId( 1 ), &tracks ).unwrap();

        let loaded = f.store.load( UserId( 1 ) ).unwrap();
        assert_eq!( loaded.tracks, tracks );
        assert!( !loaded.skipped_missing );
    }


    #[test]
    fn test_save_replaces_previous_playlist() {
        let mut f = Fixture::new();
        let first = vec![ f.file( "a.wav" ), f.file( "b.wav" ) ];
        let second = vec![ f.file( "c.wav" ) ];
        f.store.save( UserId( 1 ), &first ).unwrap();
        f.store.save( UserId( 1 ), &second ).unwrap();

        assert_eq!( f.store.load( UserId( 1 ) ).unwrap().tracks, second );
    }


    #[test]
    fn test_users_are_isolated() {
        let mut f = Fixture::new();
        let mine = vec![ f.file( "a.wav" ) ];
        let theirs = vec![ f.file( "b.wav" ) ];
        f.store.save( UserId( 1 ), &mine ).unwrap();
        f.store.save( UserId( 2 ), &theirs ).unwrap();

        assert_eq!( f.store.load( UserId( 1 ) ).unwrap().tracks, mine );
        assert_eq!( f.store.load( UserId( 2 ) ).unwrap().tracks, theirs );
        assert!( f.store.load( UserId( 3 ) ).unwrap().tracks.is_empty() );
    }


    #[test]
    fn test_load_skips_missing_files() {
        let mut f = Fixture::new();
        let tracks = vec![ f.file( "a.wav" ), f.ghost( "gone.wav" ), f.file( "b.wav" ) ];
        f.store.save( UserId( 1 ), &tracks ).unwrap();

        let loaded = f.store.load( UserId( 1 ) ).unwrap();
        assert_eq!( names( &loaded.tracks ), vec![ "a.wav", "b.wav" ] );
        assert!( loaded.skipped_missing );
    }


    #[test]
    fn test_search_matches_names_once() {
        let mut f = Fixture::new();
        let tracks = vec![
            f.file( "Abba - Song.wav" ),
            f.file( "Crab Walk.wav" ),
            f.file( "Tune.wav" ),
            f.ghost( "Abandoned.wav" ),
        ];
        f.store.save( UserId( 1 ), &tracks ).unwrap();

        let found = f.store.search( UserId( 1 ), "ab" ).unwrap();
        assert_eq!( names( &found ), vec![ "Abba - Song.wav", "Crab Walk.wav" ] );
    }


    #[test]
    fn test_remove_deletes_by_path() {
        let mut f = Fixture::new();
        let tracks = vec![ f.file( "a.wav" ), f.file( "b.wav" ) ];
        f.store.save( UserId( 1 ), &tracks ).unwrap();
        f.store.remove( UserId( 1 ), &tracks[ ..1 ] ).unwrap();

        assert_eq!( names( &f.store.load( UserId( 1 ) ).unwrap().tracks ), vec![ "b.wav" ] );
    }


    #[test]
    fn test_in_memory_store() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.save( UserId( 9 ), &[] ).unwrap();
        assert!( store.load( UserId( 9 ) ).unwrap().tracks.is_empty() );
    }
}
