//! Slash command parsing.
//!
//! Commands typed after `/` in the terminal front end are parsed into a
//! typed `Command`; the front end maps each one onto a player request.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;


/// Errors that can occur during command parsing.
#[derive( Debug, Error )]
pub enum CommandError {
    #[error( "Unknown command: {0}" )]
    Unknown( String ),

    #[error( "Invalid argument: {0}" )]
    InvalidArgument( String ),

    #[error( "Missing argument: {0}" )]
    MissingArgument( String ),
}


/// Parsed slash command.
#[derive( Debug, Clone, PartialEq )]
pub enum Command {
    // Playlist commands
    Add { path: PathBuf },
    Remove,
    Save,
    Load,
    Search { term: String },
    Reset,
    Shuffle,
    Repeat,

    // Playback commands
    /// Zero-based index; typed one-based as shown in the list
    Play { index: Option<usize> },
    Pause,
    Stop,
    Next,
    Prev,
    Seek { position: Duration },

    // Other commands
    Volume { level: Option<u8> },
    Help,
    Quit,
}


impl Command {
    /// Parses a command string (without the leading `/`).
    ///
    /// @param input - The command string to parse
    ///
    /// @returns The parsed command or an error
    pub fn parse( input: &str ) -> Result<Self, CommandError> {
        let input = input.trim();
        let mut parts = input.splitn( 2, ' ' );
        let cmd = parts.next().unwrap_or( "" ).to_lowercase();
        let args = parts.next().map( |s| s.trim() ).filter( |s| !s.is_empty() );

        match cmd.as_str() {
            // Playlist commands
            "add" | "a" => {
                let path = args
                    .ok_or_else( || CommandError::MissingArgument( "path".into() ) )?;
                Ok( Command::Add { path: PathBuf::from( path ) } )
            }
            "remove" | "rm" | "del" => Ok( Command::Remove ),
            "save" => Ok( Command::Save ),
            "load" => Ok( Command::Load ),
            "search" | "find" => {
                let term = args
                    .ok_or_else( || CommandError::MissingArgument( "search term".into() ) )?;
                Ok( Command::Search { term: term.to_string() } )
            }
            "reset" => Ok( Command::Reset ),
            "shuffle" | "sh" => Ok( Command::Shuffle ),
            "repeat" | "rep" => Ok( Command::Repeat ),

            // Playback commands
            "play" | "p" => {
                let index = args.map( parse_track_number ).transpose()?;
                Ok( Command::Play { index } )
            }
            "pause" | "pa" => Ok( Command::Pause ),
            "stop" | "st" => Ok( Command::Stop ),
            "next" | "n" => Ok( Command::Next ),
            "prev" | "previous" | "pr" => Ok( Command::Prev ),
            "seek" | "sk" => {
                let time_str = args
                    .ok_or_else( || CommandError::MissingArgument( "time position".into() ) )?;
                let position = parse_time( time_str )?;
                Ok( Command::Seek { position } )
            }

            // Other commands
            "vol" | "volume" => {
                let level = args
                    .map( |s| s.parse::<u8>()
                        .map_err( |_| CommandError::InvalidArgument( format!( "Invalid volume: {}", s ) ) ) )
                    .transpose()?;
                Ok( Command::Volume { level: level.map( |l| l.min( 100 ) ) } )
            }
            "help" | "h" => Ok( Command::Help ),
            "quit" | "q" | "exit" => Ok( Command::Quit ),

            "" => Err( CommandError::Unknown( "empty command".into() ) ),
            other => Err( CommandError::Unknown( other.to_string() ) ),
        }
    }


    /// Returns a brief description of the command for help text.
    pub fn description( &self ) -> &'static str {
        match self {
            Command::Add { .. } => "Add file/folder to playlist",
            Command::Remove => "Remove selected track",
            Command::Save => "Save playlist",
            Command::Load => "Load saved playlist",
            Command::Search { .. } => "Search saved playlist",
            Command::Reset => "Show the whole playlist",
            Command::Shuffle => "Play a random track",
            Command::Repeat => "Toggle repeat",
            Command::Play { .. } => "Play or resume",
            Command::Pause => "Pause playback",
            Command::Stop => "Stop playback",
            Command::Next => "Next track",
            Command::Prev => "Previous track",
            Command::Seek { .. } => "Seek to position",
            Command::Volume { .. } => "Set volume (0-100)",
            Command::Help => "Show help",
            Command::Quit => "Quit application",
        }
    }
}


/// Parses a one-based track number into an index.
fn parse_track_number( s: &str ) -> Result<usize, CommandError> {
    match s.parse::<usize>() {
        Ok( n ) if n > 0 => Ok( n - 1 ),
        _ => Err( CommandError::InvalidArgument( format!( "Invalid track number: {}", s ) ) ),
    }
}


/// Parses a time string like "1:30" or "90" into a Duration.
///
/// @param s - Time string in format "MM:SS", "M:SS", or just seconds
///
/// @returns Duration or error
pub fn parse_time( s: &str ) -> Result<Duration, CommandError> {
    let s = s.trim();

    if let Some(( min, sec )) = s.split_once( ':' ) {
        let minutes: u64 = min.parse()
            .map_err( |_| CommandError::InvalidArgument( format!( "Invalid minutes: {}", min ) ) )?;
        let seconds: u64 = sec.parse()
            .map_err( |_| CommandError::InvalidArgument( format!( "Invalid seconds: {}", sec ) ) )?;
        Ok( Duration::from_secs( minutes * 60 + seconds ) )
    } else {
        let seconds: u64 = s.parse()
            .map_err( |_| CommandError::InvalidArgument( format!( "Invalid time: {}", s ) ) )?;
        Ok( Duration::from_secs( seconds ) )
    }
}


/// Returns help text listing all available commands.
pub fn help_text() -> &'static str {
    r#"Playlist Commands:
  /add <path>     Add file/folder to playlist
  /remove         Remove selected track       [d]
  /save           Save playlist
  /load           Load saved playlist
  /search <term>  Search saved playlist
  /reset          Show the whole playlist     [Esc]
  /shuffle        Play a random track         [z]
  /repeat         Toggle repeat               [r]

Playback Commands:
  /play [n]       Play track n, or resume     [Enter]
  /pause          Pause / resume              [Space]
  /stop           Stop playback               [s]
  /next           Next track                  [n]
  /prev           Previous track              [p]
  /seek <time>    Seek to position (e.g., 1:30)

Other Commands:
  /vol [0-100]    Set volume                  [+/-]
  /help           Show this help              [?]
  /quit           Exit trackdeck              [q]

Keys: f filter the list, Left/Right seek 5s, click the bar to scrub"#
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_parse_add() {
        let cmd = Command::parse( "add /path/to/file.mp3" ).unwrap();
        assert_eq!( cmd, Command::Add { path: PathBuf::from( "/path/to/file.mp3" ) } );
    }


    #[test]
    fn test_parse_add_alias() {
        let cmd = Command::parse( "a /music" ).unwrap();
        assert_eq!( cmd, Command::Add { path: PathBuf::from( "/music" ) } );
    }


    #[test]
    fn test_parse_seek() {
        let cmd = Command::parse( "seek 1:30" ).unwrap();
        assert_eq!( cmd, Command::Seek { position: Duration::from_secs( 90 ) } );
    }


    #[test]
    fn test_parse_seek_seconds() {
        let cmd = Command::parse( "seek 45" ).unwrap();
        assert_eq!( cmd, Command::Seek { position: Duration::from_secs( 45 ) } );
    }


    #[test]
    fn test_parse_play_is_one_based() {
        assert_eq!( Command::parse( "play" ).unwrap(), Command::Play { index: None } );
        assert_eq!( Command::parse( "play 3" ).unwrap(), Command::Play { index: Some( 2 ) } );
        assert!( matches!( Command::parse( "play 0" ), Err( CommandError::InvalidArgument( _ ) ) ) );
    }


    #[test]
    fn test_parse_volume() {
        assert_eq!( Command::parse( "vol" ).unwrap(), Command::Volume { level: None } );
        assert_eq!( Command::parse( "vol 40" ).unwrap(), Command::Volume { level: Some( 40 ) } );
        assert_eq!( Command::parse( "vol 200" ).unwrap(), Command::Volume { level: Some( 100 ) } );
        assert!( matches!( Command::parse( "vol loud" ), Err( CommandError::InvalidArgument( _ ) ) ) );
    }


    #[test]
    fn test_parse_search_keeps_spaces() {
        let cmd = Command::parse( "search  crab walk " ).unwrap();
        assert_eq!( cmd, Command::Search { term: "crab walk".into() } );
    }


    #[test]
    fn test_parse_unknown() {
        let result = Command::parse( "foobar" );
        assert!( matches!( result, Err( CommandError::Unknown( _ ) ) ) );
    }


    #[test]
    fn test_parse_missing_arg() {
        assert!( matches!( Command::parse( "add" ), Err( CommandError::MissingArgument( _ ) ) ) );
        assert!( matches!( Command::parse( "search   " ), Err( CommandError::MissingArgument( _ ) ) ) );
    }
}
