//! Input mode handling for the TUI.
//!
//! Tracks whether keys drive the player, a slash command, or the live
//! playlist filter, and holds the line being typed.


/// Current input mode of the application.
#[derive( Debug, Clone, Copy, PartialEq, Eq, Default )]
pub enum InputMode {
    /// Keyboard shortcuts active.
    #[default]
    Normal,

    /// Typing a slash command.
    Command,

    /// Typing a filter; the playlist narrows as you type.
    Filter,
}


impl InputMode {
    /// Prompt shown before the typed text.
    pub fn prompt( &self ) -> &'static str {
        match self {
            InputMode::Normal => "",
            InputMode::Command => "/",
            InputMode::Filter => "Filter: ",
        }
    }
}


/// Single-line text entry with a character cursor.
#[derive( Debug, Default )]
pub struct InputBuffer {
    content: String,
    /// Cursor position in characters
    cursor: usize,
}


impl InputBuffer {
    pub fn new() -> Self {
        Self::default()
    }


    /// Byte offset of the character at `index`.
    fn byte_at( &self, index: usize ) -> usize {
        self.content
            .char_indices()
            .nth( index )
            .map( |( i, _ )| i )
            .unwrap_or( self.content.len() )
    }


    fn char_count( &self ) -> usize {
        self.content.chars().count()
    }


    /// Inserts a character at the cursor.
    pub fn insert( &mut self, c: char ) {
        let at = self.byte_at( self.cursor );
        self.content.insert( at, c );
        self.cursor += 1;
    }


    /// Deletes the character before the cursor.
    pub fn backspace( &mut self ) {
        if self.cursor > 0 {
            self.cursor -= 1;
            let at = self.byte_at( self.cursor );
            self.content.remove( at );
        }
    }


    /// Deletes the character under the cursor.
    pub fn delete( &mut self ) {
        if self.cursor < self.char_count() {
            let at = self.byte_at( self.cursor );
            self.content.remove( at );
        }
    }


    pub fn clear( &mut self ) {
        self.content.clear();
        self.cursor = 0;
    }


    /// Empties the buffer and returns what was typed.
    pub fn take( &mut self ) -> String {
        self.cursor = 0;
        std::mem::take( &mut self.content )
    }


    pub fn content( &self ) -> &str {
        &self.content
    }


    /// Cursor position in characters, for display.
    pub fn cursor( &self ) -> usize {
        self.cursor
    }


    pub fn move_left( &mut self ) {
        self.cursor = self.cursor.saturating_sub( 1 );
    }


    pub fn move_right( &mut self ) {
        self.cursor = ( self.cursor + 1 ).min( self.char_count() );
    }


    pub fn move_home( &mut self ) {
        self.cursor = 0;
    }


    pub fn move_end( &mut self ) {
        self.cursor = self.char_count();
    }


    pub fn is_empty( &self ) -> bool {
        self.content.is_empty()
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    fn typed( text: &str ) -> InputBuffer {
        let mut buffer = InputBuffer::new();
        text.chars().for_each( |c| buffer.insert( c ) );
        buffer
    }


    #[test]
    fn test_insert_and_backspace() {
        let mut buffer = typed( "abba" );
        assert_eq!( buffer.content(), "abba" );
        assert_eq!( buffer.cursor(), 4 );

        buffer.backspace();
        assert_eq!( buffer.content(), "abb" );
    }


    #[test]
    fn test_editing_mid_line_with_multibyte_chars() {
        let mut buffer = typed( "caf" );
        buffer.move_home();
        buffer.move_right();
        buffer.insert( 'é' );
        assert_eq!( buffer.content(), "céaf" );

        buffer.move_left();
        buffer.delete();
        assert_eq!( buffer.content(), "caf" );

        buffer.move_end();
        buffer.insert( 'é' );
        assert_eq!( buffer.content(), "café" );
        assert_eq!( buffer.cursor(), 4 );
    }


    #[test]
    fn test_cursor_stays_in_bounds() {
        let mut buffer = typed( "ab" );
        buffer.move_right();
        assert_eq!( buffer.cursor(), 2 );
        buffer.move_home();
        buffer.move_left();
        buffer.backspace();
        assert_eq!( buffer.cursor(), 0 );
        assert_eq!( buffer.content(), "ab" );
    }


    #[test]
    fn test_take_empties_buffer() {
        let mut buffer = typed( "save" );
        assert_eq!( buffer.take(), "save" );
        assert!( buffer.is_empty() );
        assert_eq!( buffer.cursor(), 0 );
    }
}
